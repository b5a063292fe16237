// Launched by the browser as a native-messaging host; stdin/stdout carry the
// extension protocol, so failures go to stderr and the log file only.

#[tokio::main]
async fn main() {
    if let Err(e) = nat_overlay::run().await {
        tracing::error!(error = %e, "overlay host failed");
        eprintln!("nat-overlay-host: {e:#}");
        std::process::exit(1);
    }
}
