#[tokio::main]
async fn main() {
    let code = lib_warden::init().await;
    std::process::exit(code);
}
