use chrono::{TimeZone, Utc};
use mailsync_api::models::{MessageRecord, NewSyncLog, SyncCursor, SyncMode};
use mailsync_api::sync::{AccountRegistry, PgAccountRegistry, PgSyncStore, SyncStore};
use mailsync_api::test_support::{TestDatabase, TestDatabaseError};

async fn provision(test_name: &str) -> Option<TestDatabase> {
    match TestDatabase::new().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::Container(err)) => {
            eprintln!("skipping {test_name}: no container runtime ({err})");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

fn record(account_id: i32, message_id: &str, uid: u32) -> MessageRecord {
    MessageRecord {
        account_id,
        message_id: message_id.to_string(),
        uid,
        subject: format!("Message {uid}"),
        from_name: "Supplier".into(),
        from_address: "desk@supplier.example".into(),
        to_addresses: vec!["orders@shop.example".into()],
        in_reply_to: None,
        sent_at: Utc.with_ymd_and_hms(2025, 3, 4, 9, 15, 0).unwrap(),
        received_at: None,
        body_text: "Please confirm delivery.".into(),
        size_bytes: 128,
    }
}

fn cursor(account_id: i32, uid_validity: Option<u32>, last_uid: u32) -> SyncCursor {
    SyncCursor {
        account_id,
        uid_validity,
        last_uid,
        recent_message_ids: vec![format!("m{last_uid}@shop")],
        last_message_at: None,
        last_synced_at: Utc::now(),
    }
}

#[tokio::test]
async fn registry_lists_active_accounts_in_id_order() {
    let Some(db) = provision("registry test").await else {
        return;
    };
    let first = db.insert_account("Orders", true).await.expect("insert");
    db.insert_account("Archive", false).await.expect("insert");
    let third = db.insert_account("Billing", true).await.expect("insert");

    let registry = PgAccountRegistry::new(db.pool_clone());
    let accounts = registry.list_active_accounts().await.expect("accounts");
    let ids: Vec<i32> = accounts.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![first, third]);
    assert_eq!(accounts[0].mailbox.folder, "INBOX");
    assert_eq!(accounts[0].mailbox.port, 993);

    assert!(registry.get_account(9_999).await.expect("lookup").is_none());

    db.close().await;
}

#[tokio::test]
async fn message_insert_is_idempotent() {
    let Some(db) = provision("message insert test").await else {
        return;
    };
    let account = db.insert_account("Orders", true).await.expect("insert");
    let store = PgSyncStore::new(db.pool_clone());

    assert!(!store.has_message(account, "po-1@shop").await.expect("lookup"));
    assert!(
        store
            .insert_message_if_absent(&record(account, "po-1@shop", 1))
            .await
            .expect("insert")
    );
    assert!(
        !store
            .insert_message_if_absent(&record(account, "po-1@shop", 1))
            .await
            .expect("duplicate insert")
    );
    assert!(store.has_message(account, "po-1@shop").await.expect("lookup"));

    db.close().await;
}

#[tokio::test]
async fn cursor_upsert_never_moves_back_within_validity() {
    let Some(db) = provision("cursor test").await else {
        return;
    };
    let account = db.insert_account("Orders", true).await.expect("insert");
    let store = PgSyncStore::new(db.pool_clone());

    assert!(store.get_cursor(account).await.expect("load").is_none());

    store
        .set_cursor(&cursor(account, Some(7), 40))
        .await
        .expect("save");
    store
        .set_cursor(&cursor(account, Some(7), 12))
        .await
        .expect("save");
    let stored = store.get_cursor(account).await.expect("load").expect("cursor");
    assert_eq!(stored.last_uid, 40);
    assert_eq!(stored.uid_validity, Some(7));

    // A new UIDVALIDITY replaces the position outright.
    store
        .set_cursor(&cursor(account, Some(8), 3))
        .await
        .expect("save");
    let stored = store.get_cursor(account).await.expect("load").expect("cursor");
    assert_eq!(stored.last_uid, 3);
    assert_eq!(stored.uid_validity, Some(8));
    assert_eq!(stored.recent_message_ids, vec!["m3@shop".to_string()]);

    db.close().await;
}

#[tokio::test]
async fn sync_logs_are_listed_newest_first() {
    let Some(db) = provision("sync log test").await else {
        return;
    };
    let orders = db.insert_account("Orders", true).await.expect("insert");
    let billing = db.insert_account("Billing", true).await.expect("insert");
    let store = PgSyncStore::new(db.pool_clone());

    let entry = |account_id: i32, mode: SyncMode, success: bool| NewSyncLog {
        account_id,
        mode,
        started_at: Utc::now(),
        finished_at: Utc::now(),
        success,
        new_count: 2,
        skipped_count: 0,
        error: (!success).then(|| "connection error: refused".to_string()),
    };

    let first = store
        .append_sync_log(&entry(orders, SyncMode::Incremental, true))
        .await
        .expect("append");
    let second = store
        .append_sync_log(&entry(billing, SyncMode::Full, false))
        .await
        .expect("append");
    assert!(second > first);

    let all = store.recent_sync_logs(None, 10).await.expect("logs");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, second);
    assert_eq!(all[0].mode, SyncMode::Full);
    assert!(!all[0].success);

    let only_orders = store.recent_sync_logs(Some(orders), 10).await.expect("logs");
    assert_eq!(only_orders.len(), 1);
    assert_eq!(only_orders[0].mode, SyncMode::Incremental);

    db.close().await;
}
