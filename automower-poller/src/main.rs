fn main() {
    if let Err(err) = automower_bridge::app::run_poller() {
        eprintln!("poller startup failed: {err}");
        std::process::exit(1);
    }
}
