use crate::common::*;

const KEY: &str = "COMPL-AAAA-BBBB-CCCC-DDDD";

#[test]
fn test_append_and_read_back() {
    let env = create_test_env();
    let conn = env.state.audit.get().unwrap();

    let record = NewValidationRecord::failure(KEY, 1_000, "License expired")
        .with_client(Some("203.0.113.7"), Some("complio-cli/1.0"));
    let stored = queries::append_validation(&conn, &record).unwrap();

    assert!(!stored.success);
    assert_eq!(stored.error_message.as_deref(), Some("License expired"));

    let trail = queries::recent_validations_for_key(&conn, KEY, 10).unwrap();
    assert_eq!(trail, vec![stored]);
}

#[test]
fn test_recent_for_key_is_newest_first() {
    let env = create_test_env();
    let conn = env.state.audit.get().unwrap();

    for at in [100, 300, 200] {
        queries::append_validation(&conn, &NewValidationRecord::success(KEY, at)).unwrap();
    }
    queries::append_validation(
        &conn,
        &NewValidationRecord::success("COMPL-1111-2222-3333-4444", 400),
    )
    .unwrap();

    let trail = queries::recent_validations_for_key(&conn, KEY, 2).unwrap();
    let times: Vec<i64> = trail.iter().map(|r| r.validated_at).collect();
    assert_eq!(times, vec![300, 200]);
    assert_eq!(queries::count_validations_for_key(&conn, KEY).unwrap(), 3);
}

#[test]
fn test_records_cannot_be_deleted() {
    let env = create_test_env();
    let conn = env.state.audit.get().unwrap();
    queries::append_validation(&conn, &NewValidationRecord::success(KEY, 100)).unwrap();

    let result = conn.execute("DELETE FROM validations", []);
    assert!(result.is_err(), "delete should be blocked");
    assert_eq!(queries::count_validations_for_key(&conn, KEY).unwrap(), 1);
}

#[test]
fn test_records_cannot_be_rewritten() {
    let env = create_test_env();
    let conn = env.state.audit.get().unwrap();
    queries::append_validation(&conn, &NewValidationRecord::failure(KEY, 100, "Invalid signature"))
        .unwrap();

    assert!(
        conn.execute("UPDATE validations SET success = 1, error_message = NULL", [])
            .is_err()
    );
    assert!(
        conn.execute(
            "UPDATE validations SET license_key = 'COMPL-0000-0000-0000-0000'",
            []
        )
        .is_err()
    );

    // Nulling the key is the one permitted change
    assert_eq!(queries::detach_license_key(&conn, KEY).unwrap(), 1);
    assert_eq!(queries::count_validations_for_key(&conn, KEY).unwrap(), 0);
}

#[test]
fn test_success_and_error_message_must_agree() {
    let env = create_test_env();
    let conn = env.state.audit.get().unwrap();

    let result = conn.execute(
        "INSERT INTO validations (id, license_key, validated_at, success, error_message)
         VALUES ('x', ?1, 1, 1, 'oops')",
        [KEY],
    );
    assert!(result.is_err());

    let result = conn.execute(
        "INSERT INTO validations (id, license_key, validated_at, success, error_message)
         VALUES ('y', ?1, 1, 0, NULL)",
        [KEY],
    );
    assert!(result.is_err());
}
