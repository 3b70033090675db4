use sea_orm_migration::prelude::*;

use courier_messaging_migration::Migrator;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
