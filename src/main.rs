#[tokio::main]
async fn main() {
    parley::web::run().await;
}
