mod common;

use chrono::Utc;
use common::{RecordingNotifier, ScriptedOrderApi, quote};
use std::sync::Arc;
use viewshop::domain::account::UserAccount;
use viewshop::domain::notification::Notification;
use viewshop::domain::order::Order;
use viewshop::domain::ports::{LedgerStore, LedgerStoreRef, Notifier, NotifierRef, OrderApi, OrderApiRef};
use viewshop::infrastructure::in_memory::InMemoryLedgerStore;
use viewshop::infrastructure::json_file::JsonFileLedgerStore;

#[tokio::test]
async fn test_ports_as_trait_objects() {
    let dir = tempfile::tempdir().unwrap();
    let stores: Vec<LedgerStoreRef> = vec![
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(JsonFileLedgerStore::open(dir.path()).unwrap()),
    ];
    let api: OrderApiRef = Arc::new(ScriptedOrderApi::succeeding());
    let notifier: NotifierRef = Arc::new(RecordingNotifier::default());

    for store in stores {
        let mut account = UserAccount::new("1", Utc::now());
        account.coins = 100;
        let order = Order::new("ORD_DYN0000001".to_string(), "1", quote(100, "immediate"), Utc::now());

        // Verify Send + Sync by spawning tasks
        let user_store = store.clone();
        let user_handle = tokio::spawn(async move {
            user_store.put_user(account).await.unwrap();
            user_store.get_user("1").await.unwrap().unwrap()
        });

        let order_store = store.clone();
        let order_api = api.clone();
        let order_handle = tokio::spawn(async move {
            order_store.append_order(order.clone()).await.unwrap();
            order_api.submit(&order).await.unwrap()
        });

        let notify = notifier.clone();
        let notify_handle = tokio::spawn(async move {
            notify
                .notify("1", Notification::CoinsGranted { amount: 100, balance: 100 })
                .await
        });

        assert_eq!(user_handle.await.unwrap().coins, 100);
        assert!(order_handle.await.unwrap().starts_with("EXT-"));
        notify_handle.await.unwrap().unwrap();
        assert!(store.get_order("ORD_DYN0000001").await.unwrap().is_some());
    }
}
