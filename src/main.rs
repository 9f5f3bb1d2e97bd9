use heretic_session::frameworks::server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    server::run_with_config().await
}
