// Integration tests for the reconciliation classification and the cursor
// contract, exercised through the public API.

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use wallet_engine::models::ReconciliationStatus;
    use wallet_engine::reconciliation::service::classify;
    use wallet_engine::services::{decode_cursor, encode_cursor, EntryCursor};
    use wallet_engine::WalletEngineError;

    #[test]
    fn test_classify_exact_match() {
        let (status, notes) = classify(dec!(1000000.00), dec!(1000000.00));
        assert_eq!(status, ReconciliationStatus::Match);
        assert_eq!(notes, "Balance matches");
        assert_eq!(status.severity(), "INFO");
    }

    #[test]
    fn test_classify_stored_exceeds_ledger() {
        // Stored above calculated - the dangerous direction: the wallet
        // claims money the ledger cannot account for.
        let (status, notes) = classify(dec!(1000.00), dec!(95.00));
        assert_eq!(status, ReconciliationStatus::Mismatch);
        assert_eq!(status.severity(), "WARNING");
        assert!(notes.contains("difference=905.00"));
    }

    #[test]
    fn test_classify_ledger_exceeds_stored() {
        let (status, notes) = classify(dec!(95.00), dec!(1000.00));
        assert_eq!(status, ReconciliationStatus::Mismatch);
        assert!(notes.contains("difference=-905.00"));
    }

    #[test]
    fn test_classify_fresh_wallet() {
        let (status, _) = classify(Decimal::ZERO, Decimal::ZERO);
        assert_eq!(status, ReconciliationStatus::Match);
    }

    #[test]
    fn test_classify_one_cent_drift_is_a_mismatch() {
        // There is no tolerance band; a ledger is either right or wrong.
        let (status, _) = classify(dec!(5000000.01), dec!(5000000.00));
        assert_eq!(status, ReconciliationStatus::Mismatch);
    }

    #[test]
    fn test_double_entry_error_reserved_severity() {
        assert_eq!(ReconciliationStatus::DoubleEntryError.severity(), "CRITICAL");
    }

    #[test]
    fn test_cursor_wire_format_is_base64_json() {
        let cursor = EntryCursor {
            id: 123,
            created_at: Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap(),
        };

        let encoded = encode_cursor(&cursor).unwrap();
        let decoded_json = BASE64.decode(&encoded).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&decoded_json).unwrap();

        assert_eq!(value["id"], 123);
        assert_eq!(value["created_at"], "2024-03-15T09:00:00Z");

        assert_eq!(decode_cursor(&encoded).unwrap(), cursor);
    }

    #[test]
    fn test_cursor_decoder_accepts_externally_built_tokens() {
        // A client may build the token itself as long as it is standard
        // base64 (with padding) of the JSON object.
        let raw = BASE64.encode(r#"{"id": 9, "created_at": "2023-01-01T00:00:00Z"}"#);
        let cursor = decode_cursor(&raw).unwrap();

        assert_eq!(cursor.id, 9);
        assert_eq!(
            cursor.created_at,
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_cursor_decoder_rejects_garbage() {
        assert!(matches!(
            decode_cursor("@@@not-base64@@@"),
            Err(WalletEngineError::InvalidCursor)
        ));

        let bad_json = BASE64.encode("[1, 2, 3]");
        assert!(matches!(
            decode_cursor(&bad_json),
            Err(WalletEngineError::InvalidCursor)
        ));

        let missing_field = BASE64.encode(r#"{"id": 5}"#);
        assert!(matches!(
            decode_cursor(&missing_field),
            Err(WalletEngineError::InvalidCursor)
        ));
    }
}
