use chrono::NaiveDate;
use points_core::{
    ContractId, ContractRecord, ContractStatus, ExcellenceTier, GameId, PointPool, PointStore,
    Points,
};
use points_engine::memory::MemoryStore;
use points_engine::{EngineError, EngineSettings, PointEngine, ReconcileMode};
use rust_decimal::Decimal;

fn confirmed(id: &str, game: i64, amount: Points, self_first: bool) -> ContractRecord {
    ContractRecord {
        contract_id: ContractId(id.to_string()),
        company_name: "Studio A".into(),
        assigned_game: Some(GameId(game)),
        amount_raw: Some(points_core::format_amount(amount)),
        selected_vendor: Some("Vendor Co".into()),
        status: ContractStatus::FinalContractSigned,
        use_self_points_first: self_first,
        service_category: Some("마케팅".into()),
        work_end_date: None,
        base_points_used: 0,
        self_points_used: 0,
    }
}

fn engine(
    pools: Vec<PointPool>,
    contracts: Vec<ContractRecord>,
) -> PointEngine<MemoryStore> {
    PointEngine::new(
        MemoryStore::with_data(pools, contracts),
        EngineSettings::default(),
    )
}

async fn stored(engine: &PointEngine<MemoryStore>, id: &str) -> ContractRecord {
    engine
        .store()
        .contract(&ContractId(id.to_string()))
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn self_first_cohort_spills_before_base_only() {
    let engine = engine(
        vec![PointPool::new(GameId(1), "Nova", "Studio A", 100, 0)],
        vec![confirmed("A", 1, 60, true), confirmed("B", 1, 60, false)],
    );
    let usage = engine.usage().compute_usage(GameId(1)).await.unwrap();
    assert_eq!(usage.self_used, 0);
    assert_eq!(usage.allocation.self_first.distribution.base_used, 60);
    assert_eq!(usage.allocation.base_only.distribution.base_used, 40);
    assert_eq!(usage.total_used, 100);
    assert_eq!(usage.requested, 120);
    assert!(usage.insufficient());
    assert_eq!(usage.shortfall(), 20);
}

#[tokio::test]
async fn end_to_end_scenario() {
    let engine = engine(
        vec![PointPool::new(GameId(7), "Nova", "Studio A", 1_000_000, 500_000)],
        vec![
            confirmed("A", 7, 600_000, true),
            confirmed("B", 7, 700_000, false),
        ],
    );
    let usage = engine.usage().compute_usage(GameId(7)).await.unwrap();
    assert_eq!(usage.self_used, 500_000);
    assert_eq!(usage.base_used, 800_000);
    assert!(!usage.insufficient());

    let report = engine
        .reconciler()
        .reconcile(GameId(7), ReconcileMode::Proportional)
        .await
        .unwrap();
    assert!(report.is_complete());
    let a = stored(&engine, "A").await;
    let b = stored(&engine, "B").await;
    assert_eq!((a.self_points_used, a.base_points_used), (500_000, 100_000));
    assert_eq!((b.self_points_used, b.base_points_used), (0, 700_000));
}

#[tokio::test]
async fn unknown_game_reads_as_zero_but_cannot_reconcile() {
    let engine = engine(vec![], vec![]);
    let usage = engine.usage().compute_usage(GameId(404)).await.unwrap();
    assert_eq!(usage.total_used, 0);
    assert!(!usage.insufficient());

    let err = engine
        .reconciler()
        .reconcile(GameId(404), ReconcileMode::Proportional)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::GameNotFound(GameId(404))));
}

#[tokio::test]
async fn ineligible_contracts_do_not_count() {
    let mut quote = confirmed("Q", 1, 500, false);
    quote.status = ContractStatus::QuoteRequested;
    let mut no_vendor = confirmed("V", 1, 500, false);
    no_vendor.selected_vendor = None;
    let mut no_amount = confirmed("N", 1, 0, false);
    no_amount.amount_raw = Some("미정".into());
    let mut settled = confirmed("S", 1, 30, false);
    settled.status = ContractStatus::SettlementClosed;

    let engine = engine(
        vec![PointPool::new(GameId(1), "Nova", "Studio A", 100, 0)],
        vec![quote, no_vendor, no_amount, settled],
    );
    let usage = engine.usage().compute_usage(GameId(1)).await.unwrap();
    assert_eq!(usage.requested, 30);
    assert_eq!(usage.base_used, 30);
}

#[tokio::test]
async fn failed_write_is_reported_and_others_proceed() {
    let engine = engine(
        vec![PointPool::new(GameId(1), "Nova", "Studio A", 1_000, 0)],
        vec![
            confirmed("A", 1, 100, false),
            confirmed("B", 1, 200, false),
            confirmed("C", 1, 300, false),
        ],
    );
    engine.store().fail_writes_for(ContractId("B".into()));

    let report = engine
        .reconciler()
        .reconcile(GameId(1), ReconcileMode::Proportional)
        .await
        .unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].contract_id, ContractId("B".into()));
    assert_eq!(report.written.len(), 2);

    assert_eq!(stored(&engine, "A").await.base_points_used, 100);
    assert_eq!(stored(&engine, "B").await.base_points_used, 0);
    assert_eq!(stored(&engine, "C").await.base_points_used, 300);
}

#[tokio::test]
async fn contracts_that_drop_out_are_cleared() {
    let mut withdrawn = confirmed("W", 1, 50, false);
    withdrawn.status = ContractStatus::QuoteRequested;
    withdrawn.base_points_used = 50;
    let engine = engine(
        vec![PointPool::new(GameId(1), "Nova", "Studio A", 100, 0)],
        vec![confirmed("A", 1, 40, false), withdrawn],
    );

    let report = engine
        .reconciler()
        .reconcile(GameId(1), ReconcileMode::Proportional)
        .await
        .unwrap();
    assert_eq!(report.cleared, vec![ContractId("W".into())]);
    assert_eq!(stored(&engine, "W").await.base_points_used, 0);
}

#[tokio::test]
async fn sequential_mode_fills_by_work_end_date() {
    let dated = |id: &str, day: u32| {
        let mut c = confirmed(id, 3, 40, false);
        c.work_end_date = NaiveDate::from_ymd_opt(2025, 3, day);
        c
    };
    let mut pool = PointPool::new(GameId(3), "Nova", "Studio A", 60, 0);
    pool.set_tier(ExcellenceTier::First, true, 100_000_000);
    let engine = engine(vec![pool], vec![dated("T3", 30), dated("T1", 10), dated("T2", 20)]);

    let report = engine
        .reconciler()
        .reconcile(GameId(3), ReconcileMode::Sequential)
        .await
        .unwrap();
    let got: Vec<(&str, Points, Points)> = report
        .written
        .iter()
        .map(|s| (s.contract_id.0.as_str(), s.base_used, s.excellent_used))
        .collect();
    assert_eq!(got, vec![("T1", 40, 0), ("T2", 20, 20), ("T3", 0, 40)]);
    assert_eq!(report.excellent_total(), 60);

    let t2 = stored(&engine, "T2").await;
    assert_eq!((t2.base_points_used, t2.self_points_used), (20, 0));
}

#[tokio::test]
async fn category_total_exceeds_pooled_by_shortfall() {
    let mut infra = confirmed("B", 1, 60, false);
    infra.service_category = Some("인프라".into());
    let mut uncategorized = confirmed("C", 1, 25, false);
    uncategorized.service_category = None;
    let engine = engine(
        vec![PointPool::new(GameId(1), "Nova", "Studio A", 100, 0)],
        vec![confirmed("A", 1, 60, true), infra, uncategorized],
    );

    let pooled = engine.usage().compute_usage(GameId(1)).await.unwrap();
    let by_category = engine.categories().compute_by_category(GameId(1)).await.unwrap();
    let category_total: Points = by_category.values().map(|c| c.total_used).sum();

    assert_eq!(category_total - pooled.total_used, pooled.shortfall());
    assert_eq!(by_category["마케팅"].self_used, 60);
    assert_eq!(by_category["Other"].base_used, 25);
    assert_eq!(by_category["컨설팅"].contract_count, 0);
}

#[tokio::test]
async fn empty_portfolio_is_empty() {
    let engine = engine(vec![], vec![]);
    assert!(engine.portfolio().compute_all().await.unwrap().is_empty());
    assert!(engine.portfolio().compute_by_company().await.unwrap().is_empty());
}

#[tokio::test]
async fn portfolio_rolls_up_per_company() {
    let mut other_studio = PointPool::new(GameId(3), "Orbit", "Studio B", 500, 0);
    other_studio.set_tier(ExcellenceTier::Second, true, 1_000);
    let engine = engine(
        vec![
            PointPool::new(GameId(1), "Nova", "Studio A", 100, 50),
            PointPool::new(GameId(2), "Pulse", "Studio A", 200, 0),
            other_studio,
        ],
        vec![
            confirmed("A", 1, 120, true),
            confirmed("B", 2, 250, false),
        ],
    );

    let games = engine.portfolio().compute_all().await.unwrap();
    assert_eq!(games.len(), 3);
    let nova = &games[0];
    assert_eq!(nova.used.self_points, 50);
    assert_eq!(nova.used.base, 70);
    assert_eq!(nova.remaining.base, 30);
    assert_eq!(nova.usage_rate, Decimal::new(8000, 2));

    let pulse = &games[1];
    assert!(pulse.insufficient);
    assert_eq!(pulse.shortfall, 50);
    assert_eq!(pulse.remaining.base, 0);

    assert_eq!(games[2].capacity.total, 1_500);
    assert_eq!(games[2].used.total, 0);

    let companies = engine.portfolio().compute_by_company().await.unwrap();
    let a = &companies["Studio A"];
    assert_eq!(a.game_count, 2);
    assert_eq!(a.capacity.total, 350);
    assert_eq!(a.used.total, 320);
    assert_eq!(a.remaining.total, 30);
    assert!(a.insufficient);
    assert!(!companies["Studio B"].insufficient);
}

#[tokio::test]
async fn portfolio_flags_total_mismatch() {
    let mut pool = PointPool::new(GameId(1), "Nova", "Studio A", 100, 0);
    pool.total_points = 999;
    let engine = engine(vec![pool], vec![]);
    let games = engine.portfolio().compute_all().await.unwrap();
    assert!(games[0].total_mismatch);
    assert_eq!(games[0].capacity.total, 100);
}

#[tokio::test]
async fn self_points_flag_only_on_eligible_contracts() {
    let mut quote = confirmed("Q", 1, 100, false);
    quote.status = ContractStatus::VendorChosen;
    let engine = engine(
        vec![PointPool::new(GameId(1), "Nova", "Studio A", 100, 100)],
        vec![confirmed("A", 1, 100, false), quote],
    );
    let policy = engine.policy();

    policy
        .set_self_points_first(&ContractId("A".into()), true)
        .await
        .unwrap();
    assert!(stored(&engine, "A").await.use_self_points_first);

    let err = policy
        .set_self_points_first(&ContractId("Q".into()), true)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PolicyNotSettable(_)));

    let err = policy
        .set_self_points_first(&ContractId("nope".into()), true)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ContractNotFound(_)));

    let usage = engine.usage().compute_usage(GameId(1)).await.unwrap();
    assert_eq!((usage.self_used, usage.base_used), (100, 0));
}

#[tokio::test]
async fn excellence_toggle_keeps_total_in_step() {
    let engine = engine(
        vec![PointPool::new(GameId(1), "Nova", "Studio A", 100, 50)],
        vec![],
    );
    let pool = engine
        .policy()
        .set_excellence(GameId(1), ExcellenceTier::Second, true)
        .await
        .unwrap();
    assert_eq!(pool.total_points, 150 + 100_000_000);
    assert!(pool.is_excellent());

    let pool = engine
        .policy()
        .set_excellence(GameId(1), ExcellenceTier::Second, false)
        .await
        .unwrap();
    assert_eq!(pool.total_points, 150);
    assert_eq!(engine.store().point_pool(GameId(1)).await.unwrap().unwrap(), pool);

    let err = engine
        .policy()
        .set_excellence(GameId(9), ExcellenceTier::First, true)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::GameNotFound(GameId(9))));
}

#[tokio::test]
async fn reconcile_all_reports_every_game() {
    let engine = engine(
        vec![
            PointPool::new(GameId(1), "Nova", "Studio A", 100, 0),
            PointPool::new(GameId(2), "Pulse", "Studio B", 100, 0),
        ],
        vec![confirmed("A", 1, 10, false), confirmed("B", 2, 20, false)],
    );
    let all = engine
        .reconciler()
        .reconcile_all(ReconcileMode::Proportional)
        .await
        .unwrap();
    assert!(all.is_complete());
    assert_eq!(all.reports.len(), 2);
    assert_eq!(stored(&engine, "B").await.base_points_used, 20);
}

#[tokio::test]
async fn works_against_sqlite() {
    let store = persistence::init_db("sqlite::memory:").await.unwrap();
    store
        .save_point_pool(&PointPool::new(GameId(7), "Nova", "Studio A", 1_000_000, 500_000))
        .await
        .unwrap();
    store.save_contract(&confirmed("A", 7, 600_000, true)).await.unwrap();
    store.save_contract(&confirmed("B", 7, 700_000, false)).await.unwrap();

    let engine = PointEngine::new(store, EngineSettings::default());
    let report = engine
        .reconciler()
        .reconcile(GameId(7), ReconcileMode::Proportional)
        .await
        .unwrap();
    assert!(report.is_complete());

    let a = engine
        .store()
        .contract(&ContractId("A".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((a.self_points_used, a.base_points_used), (500_000, 100_000));

    let games = engine.portfolio().compute_all().await.unwrap();
    assert_eq!(games[0].used.total, 1_300_000);
    assert_eq!(games[0].remaining.total, 200_000);
}

#[tokio::test]
async fn summaries_serialize_for_dashboards() {
    let engine = engine(
        vec![PointPool::new(GameId(1), "Nova", "Studio A", 100, 0)],
        vec![confirmed("A", 1, 25, false)],
    );
    let games = engine.portfolio().compute_all().await.unwrap();
    let json = serde_json::to_value(&games).unwrap();
    assert_eq!(json[0]["company_name"], "Studio A");
    assert_eq!(json[0]["used"]["base"], 25);
    assert_eq!(json[0]["remaining"]["total"], 75);
}

#[tokio::test]
async fn huge_amounts_do_not_panic_the_aggregators() {
    let huge = 10_000_000_000_000_000_000;
    let engine = engine(
        vec![PointPool::new(GameId(1), "Nova", "Studio A", 1_000, 1_000)],
        vec![confirmed("A", 1, huge, true), confirmed("B", 1, huge, false)],
    );
    let usage = engine.usage().compute_usage(GameId(1)).await.unwrap();
    assert_eq!(usage.requested, Points::MAX);
    assert_eq!(usage.total_used, 2_000);
    assert!(usage.insufficient());

    let by_category = engine.categories().compute_by_category(GameId(1)).await.unwrap();
    assert_eq!(by_category["마케팅"].total_used, Points::MAX);
}

#[tokio::test]
async fn reconcile_reads_contracts_once() {
    let engine = engine(
        vec![PointPool::new(GameId(1), "Nova", "Studio A", 100, 0)],
        vec![confirmed("A", 1, 40, false)],
    );
    engine
        .reconciler()
        .reconcile(GameId(1), ReconcileMode::Proportional)
        .await
        .unwrap();
    assert_eq!(engine.store().game_reads(), 1);
}

#[tokio::test]
async fn portfolio_categories_sum_every_game() {
    let mut infra = confirmed("B", 2, 300, false);
    infra.service_category = Some("인프라".into());
    let engine = engine(
        vec![
            PointPool::new(GameId(1), "Nova", "Studio A", 1_000, 0),
            PointPool::new(GameId(2), "Pulse", "Studio B", 1_000, 0),
        ],
        vec![confirmed("A", 1, 100, false), infra, confirmed("C", 2, 100, true)],
    );
    let stats = engine.portfolio().compute_categories().await.unwrap();
    assert_eq!(stats.total_used, 500);

    let first = &stats.categories[0];
    assert_eq!(first.category, "인프라");
    assert_eq!(first.share, Decimal::new(6000, 2));
    let marketing = &stats.categories[1];
    assert_eq!(marketing.category, "마케팅");
    assert_eq!(marketing.usage.contract_count, 2);
    assert_eq!(marketing.usage.self_used, 100);
    assert_eq!(marketing.share, Decimal::new(4000, 2));
    assert_eq!(stats.categories.len(), 4);
}

#[tokio::test]
async fn companies_rank_by_usage_rate_with_contracted_amounts() {
    let mut unassigned = confirmed("U", 0, 250, false);
    unassigned.assigned_game = None;
    let mut beta = confirmed("B", 2, 900, false);
    beta.company_name = "Studio B".into();
    let engine = engine(
        vec![
            PointPool::new(GameId(1), "Nova", "Studio A", 1_000, 0),
            PointPool::new(GameId(2), "Pulse", "Studio B", 1_000, 0),
        ],
        vec![confirmed("A", 1, 100, false), unassigned, beta],
    );
    let ranked = engine.portfolio().company_ranking().await.unwrap();
    let names: Vec<&str> = ranked.iter().map(|c| c.company_name.as_str()).collect();
    assert_eq!(names, vec!["Studio B", "Studio A"]);

    let a = &ranked[1];
    assert_eq!(a.used.total, 100);
    assert_eq!(a.contracted, 350);
    assert_eq!(a.contract_rate, Decimal::new(3500, 2));
}

#[tokio::test]
async fn threshold_rules_flag_low_games() {
    let engine = engine(
        vec![
            PointPool::new(GameId(1), "Nova", "Studio A", 1_000, 0),
            PointPool::new(GameId(2), "Pulse", "Studio A", 1_000, 0),
        ],
        vec![confirmed("A", 1, 950, false)],
    );
    let rules = [points_engine::ThresholdRule {
        company_name: Some("Studio A".into()),
        game_name: None,
        threshold: 100,
    }];
    let breaches = engine.portfolio().threshold_breaches(&rules).await.unwrap();
    assert_eq!(breaches.len(), 1);
    assert_eq!(breaches[0].game_id, GameId(1));
    assert_eq!(breaches[0].remaining, 50);
}
