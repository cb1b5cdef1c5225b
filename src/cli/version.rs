/// Display version information
pub fn execute() {
    println!("channel-gate {}", env!("CARGO_PKG_VERSION"));
    println!("Managed-access gateway for a Telegram channel");
}
