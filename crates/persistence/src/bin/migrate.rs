#![deny(warnings)]

use persistence::{default_sqlite_url, prepare_sqlite_path};
use points_core::PointStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("POINTS_DATABASE_URL")
        .unwrap_or_else(|_| default_sqlite_url().to_string());
    prepare_sqlite_path(&url)?;
    let store = persistence::init_db(&url).await?;
    let games = store.point_pools().await?.len();
    println!("DB migrated at {url} ({games} games registered)");
    Ok(())
}
