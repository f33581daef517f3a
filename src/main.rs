fn main() {
    if let Err(err) = automower_bridge::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
