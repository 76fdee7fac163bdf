use shared::{
    domain::{DealStatus, DealType},
    protocol::{DealFilters, NewDeal},
};
use storage::Storage;

#[tokio::test]
async fn status_changes_survive_reopening_the_database() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("crm.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let deal_id = {
        let storage = Storage::new(&database_url).await.expect("db");
        let user = storage
            .create_user("carol", "carol@example.com")
            .await
            .expect("user");
        let company = storage
            .create_company("Initech", "software")
            .await
            .expect("company");
        let deal_id = storage
            .create_deal(&NewDeal {
                title: "Seat expansion".into(),
                value: 48_000.0,
                status: DealStatus::InProgress,
                deal_type: DealType::Agency,
                user_id: user,
                company_id: company,
                lead_source: Some("referral".into()),
                product_name: Some("Suite".into()),
            })
            .await
            .expect("deal");

        let mut deal = storage
            .load_deal(deal_id)
            .await
            .expect("load")
            .expect("deal exists");
        deal.status = DealStatus::Won;
        assert!(storage.save_deal(&deal).await.expect("save"));
        storage.pool().close().await;
        deal_id
    };

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let deals = reopened
        .list_deals(&DealFilters {
            status: Some(DealStatus::Won),
            ..DealFilters::default()
        })
        .await
        .expect("list");
    assert_eq!(deals.len(), 1);
    assert_eq!(deals[0].id, deal_id);
    assert_eq!(deals[0].deal_type, DealType::Agency);
    assert_eq!(deals[0].lead_source.as_deref(), Some("referral"));
}
