#[tokio::main]
async fn main() {
    pharmassist::run().await;
}
