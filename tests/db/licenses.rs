use complio::error::AppError;

use crate::common::*;

fn create_input(codec: &KeyCodec, tier: Tier) -> CreateLicense {
    let issued = codec.issue(tier, "customer@example.com").unwrap();
    CreateLicense {
        license_key: issued.license_key,
        signature: issued.signature,
        email: "customer@example.com".into(),
        tier,
        expires_at: None,
        stripe_customer_id: Some("cus_123".into()),
        stripe_subscription_id: Some("sub_123".into()),
        metadata: serde_json::json!({ "plan": "monthly" }),
    }
}

#[test]
fn test_create_and_get_license() {
    let env = create_test_env();
    let conn = env.state.db.get().unwrap();
    let input = create_input(&env.state.codec, Tier::Pro);

    let created = queries::create_license(&conn, &input).unwrap();
    assert_eq!(created.status, LicenseStatus::Active);
    assert_eq!(created.validation_count, 0);
    assert_eq!(created.last_validated_at, None);

    let fetched = queries::get_license_by_key(&conn, &input.license_key)
        .unwrap()
        .expect("license should exist");
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.tier, Tier::Pro);
    assert_eq!(fetched.signature, input.signature);
    assert_eq!(fetched.stripe_subscription_id.as_deref(), Some("sub_123"));
    assert_eq!(fetched.metadata, serde_json::json!({ "plan": "monthly" }));
}

#[test]
fn test_get_unknown_key_returns_none() {
    let env = create_test_env();
    let conn = env.state.db.get().unwrap();
    assert!(
        queries::get_license_by_key(&conn, "COMPL-0000-0000-0000-0000")
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_get_malformed_key_is_rejected_before_query() {
    let env = create_test_env();
    let conn = env.state.db.get().unwrap();
    let result = queries::get_license_by_key(&conn, "'; DROP TABLE licenses; --");
    assert!(matches!(result, Err(AppError::MalformedInput(_))));
}

#[test]
fn test_duplicate_key_is_rejected() {
    let env = create_test_env();
    let conn = env.state.db.get().unwrap();
    let input = create_input(&env.state.codec, Tier::Starter);

    queries::create_license(&conn, &input).unwrap();
    let result = queries::create_license(&conn, &input);
    assert!(matches!(result, Err(AppError::DuplicateKey(_))));
}

#[test]
fn test_create_rejects_malformed_key() {
    let env = create_test_env();
    let conn = env.state.db.get().unwrap();
    let mut input = create_input(&env.state.codec, Tier::Starter);
    input.license_key = "COMPL-XYZ".into();

    let result = queries::create_license(&conn, &input);
    assert!(matches!(result, Err(AppError::MalformedInput(_))));
}

#[test]
fn test_issue_license_signs_and_stores() {
    let env = create_test_env();
    let license = create_test_license(&env.state, Tier::EarlyAccess, Some(future_timestamp(30)));

    assert!(
        env.state
            .codec
            .verify(&license.license_key, &license.signature)
            .unwrap()
    );
    let stored = fetch_license(&env.state, &license.license_key).unwrap();
    assert_eq!(stored.tier, Tier::EarlyAccess);
    assert_eq!(stored.expires_at, license.expires_at);
}

#[test]
fn test_find_by_subscription() {
    let env = create_test_env();
    let conn = env.state.db.get().unwrap();
    let input = create_input(&env.state.codec, Tier::Pro);
    let created = queries::create_license(&conn, &input).unwrap();

    let found = queries::get_license_by_subscription(&conn, "sub_123")
        .unwrap()
        .unwrap();
    assert_eq!(found.id, created.id);
    assert!(
        queries::get_license_by_subscription(&conn, "sub_missing")
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_status_transitions() {
    let env = create_test_env();
    let license = create_test_license(&env.state, Tier::Pro, None);
    let key = &license.license_key;

    let suspended = set_status(&env.state, key, LicenseStatus::Suspended);
    assert_eq!(suspended.status, LicenseStatus::Suspended);

    let reactivated = set_status(&env.state, key, LicenseStatus::Active);
    assert_eq!(reactivated.status, LicenseStatus::Active);

    let cancelled = set_status(&env.state, key, LicenseStatus::Cancelled);
    assert_eq!(cancelled.status, LicenseStatus::Cancelled);
    assert_eq!(
        fetch_license(&env.state, key).unwrap().status,
        LicenseStatus::Cancelled
    );
}

#[test]
fn test_cancelled_is_terminal() {
    let env = create_test_env();
    let license = create_test_license(&env.state, Tier::Pro, None);
    let key = &license.license_key;
    set_status(&env.state, key, LicenseStatus::Cancelled);

    let mut conn = env.state.db.get().unwrap();
    for target in [LicenseStatus::Active, LicenseStatus::Suspended] {
        let result = queries::set_license_status(&mut conn, key, target);
        assert!(
            matches!(
                result,
                Err(AppError::InvalidTransition {
                    from: LicenseStatus::Cancelled,
                    ..
                })
            ),
            "left CANCELLED for {}",
            target
        );
    }

    // Re-cancelling is a no-op
    let again = queries::set_license_status(&mut conn, key, LicenseStatus::Cancelled).unwrap();
    assert_eq!(again.status, LicenseStatus::Cancelled);
}

#[test]
fn test_set_status_unknown_key_is_not_found() {
    let env = create_test_env();
    let mut conn = env.state.db.get().unwrap();
    let result =
        queries::set_license_status(&mut conn, "COMPL-0000-0000-0000-0000", LicenseStatus::Active);
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[test]
fn test_extend_expiration() {
    let env = create_test_env();
    let license = create_test_license(&env.state, Tier::Starter, Some(past_timestamp(1)));
    let new_expiry = future_timestamp(365);

    let mut conn = env.state.db.get().unwrap();
    let renewed =
        queries::extend_license_expiration(&mut conn, &license.license_key, Some(new_expiry))
            .unwrap();
    assert_eq!(renewed.expires_at, Some(new_expiry));

    let perpetual =
        queries::extend_license_expiration(&mut conn, &license.license_key, None).unwrap();
    assert_eq!(perpetual.expires_at, None);
    assert_eq!(
        fetch_license(&env.state, &license.license_key)
            .unwrap()
            .expires_at,
        None
    );
}

#[test]
fn test_extend_expiration_of_cancelled_license_fails() {
    let env = create_test_env();
    let license = create_test_license(&env.state, Tier::Starter, None);
    set_status(&env.state, &license.license_key, LicenseStatus::Cancelled);

    let mut conn = env.state.db.get().unwrap();
    let result = queries::extend_license_expiration(
        &mut conn,
        &license.license_key,
        Some(future_timestamp(30)),
    );
    assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
}

#[test]
fn test_list_licenses_filters_and_paginates() {
    let env = create_test_env();
    for _ in 0..3 {
        create_test_license(&env.state, Tier::Pro, None);
    }
    let starter = create_test_license(&env.state, Tier::Starter, None);
    set_status(&env.state, &starter.license_key, LicenseStatus::Suspended);

    let conn = env.state.db.get().unwrap();

    let (all, total) = queries::list_licenses(&conn, &ListLicensesQuery::default()).unwrap();
    assert_eq!(total, 4);
    assert_eq!(all.len(), 4);

    let (pro, pro_total) = queries::list_licenses(
        &conn,
        &ListLicensesQuery {
            tier: Some(Tier::Pro),
            limit: Some(2),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(pro_total, 3);
    assert_eq!(pro.len(), 2);
    assert!(pro.iter().all(|l| l.tier == Tier::Pro));

    let (suspended, _) = queries::list_licenses(
        &conn,
        &ListLicensesQuery {
            status: Some(LicenseStatus::Suspended),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(suspended.len(), 1);
    assert_eq!(suspended[0].license_key, starter.license_key);
}

#[test]
fn test_increment_validation_count_is_cumulative() {
    let env = create_test_env();
    let license = create_test_license(&env.state, Tier::Pro, None);
    let conn = env.state.db.get().unwrap();

    for _ in 0..5 {
        assert!(queries::increment_validation_count(&conn, &license.license_key).unwrap());
    }
    assert_eq!(
        fetch_license(&env.state, &license.license_key)
            .unwrap()
            .validation_count,
        5
    );
    assert!(!queries::increment_validation_count(&conn, "COMPL-0000-0000-0000-0000").unwrap());
}

#[test]
fn test_delete_license_detaches_audit_history() {
    let env = create_test_env();
    let license = create_test_license(&env.state, Tier::Pro, None);
    let engine = env.state.engine();

    engine.validate(&validation_request(&license));
    engine.validate(&validation_request(&license));
    assert_eq!(audit_trail(&env.state, &license.license_key).len(), 2);

    let conn = env.state.db.get().unwrap();
    let audit_conn = env.state.audit.get().unwrap();
    assert!(
        queries::delete_license_and_detach_history(&conn, &audit_conn, &license.license_key)
            .unwrap()
    );

    assert!(fetch_license(&env.state, &license.license_key).is_none());
    assert!(audit_trail(&env.state, &license.license_key).is_empty());

    // Records survive with a null reference
    let recent = queries::recent_validations(&audit_conn, 100).unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent.iter().all(|r| r.license_key.is_none()));

    // Deleting again reports nothing deleted
    assert!(
        !queries::delete_license_and_detach_history(&conn, &audit_conn, &license.license_key)
            .unwrap()
    );
}

#[test]
fn test_retried_delete_finishes_detaching_history() {
    let env = create_test_env();
    let license = create_test_license(&env.state, Tier::Pro, None);
    env.state.engine().validate(&validation_request(&license));

    let conn = env.state.db.get().unwrap();
    let audit_conn = env.state.audit.get().unwrap();

    // Audit DB refuses the detach: the license row goes, the history keeps the key
    audit_conn
        .execute_batch(
            "CREATE TRIGGER reject_updates BEFORE UPDATE ON validations
             BEGIN SELECT RAISE(ABORT, 'audit unavailable'); END;",
        )
        .unwrap();
    assert!(
        queries::delete_license_and_detach_history(&conn, &audit_conn, &license.license_key)
            .is_err()
    );
    assert!(fetch_license(&env.state, &license.license_key).is_none());
    assert_eq!(audit_trail(&env.state, &license.license_key).len(), 1);

    // Retry once the audit DB recovers
    audit_conn
        .execute_batch("DROP TRIGGER reject_updates;")
        .unwrap();
    assert!(
        queries::delete_license_and_detach_history(&conn, &audit_conn, &license.license_key)
            .unwrap()
    );
    assert!(audit_trail(&env.state, &license.license_key).is_empty());

    let recent = queries::recent_validations(&audit_conn, 10).unwrap();
    assert_eq!(recent.len(), 1);
    assert!(recent[0].license_key.is_none());
}
