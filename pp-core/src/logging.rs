use tracing_subscriber::EnvFilter;

// The kube client and the HTTP stack under it log every request at debug; these stay at warn
// unless the verbosity string names them explicitly
const QUIET_TARGETS: &[&str] = &["hyper_util", "kube_client", "reqwest", "rustls", "tower"];

pub fn filter_directives(verbosity: &str) -> String {
    let mut directives: Vec<String> = QUIET_TARGETS
        .iter()
        .filter(|target| !verbosity.contains(*target))
        .map(|target| format!("{target}=warn"))
        .collect();
    directives.push(verbosity.into());
    directives.join(",")
}

pub fn setup_for_cli(verbosity: &str) {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::new(filter_directives(verbosity)))
        .without_time()
        .compact()
        .init();
}
