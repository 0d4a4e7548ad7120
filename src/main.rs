use adw::Application;
use adw::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> glib::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app = Application::builder()
        .application_id("com.virtualg.Client")
        .build();
    app.connect_activate(virtualg::app::build_ui);
    app.run()
}
