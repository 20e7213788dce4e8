/// Intercept messages using the `log` crate and print them to STDOUT. The
/// RUST_LOG environment variable can tune the filter; it defaults to `info`.
pub fn setup() {
    use env_logger::{Builder, Env};
    Builder::from_env(Env::default().default_filter_or("info")).init();
}
