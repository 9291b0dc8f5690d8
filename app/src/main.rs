#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rent2repay_dashboard::run().await
}
