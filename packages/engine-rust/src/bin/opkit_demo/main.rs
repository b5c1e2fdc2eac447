//! `opkit-demo`: the user directory operations behind a generated CLI.
//!
//! ```text
//! opkit-demo SaveUser '{"name":"Linus","authority":"user"}'
//! opkit-demo FindUsers --stdin < filter.json
//! opkit-demo --fixed-time 2024-01-01T00:00:00Z --validate-input spec
//! ```

mod users;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, FromArgMatches};
use opkit::cli::{self, CliOptions};
use opkit::dispatch::{DispatchOptions, GroupHooks, Registry};
use opkit::logging::{self, log_error, HookLogOptions};
use opkit_core::ExecutionContext;
use tracing::Level;

use users::UserDirectory;

const BIN_NAME: &str = "opkit-demo";

fn build_registry(dir: &Arc<UserDirectory>, options: DispatchOptions) -> Registry {
    let writes =
        GroupHooks::new().on_error(log_error(HookLogOptions::new(Level::WARN, "write rejected")));

    users::register(
        Registry::builder()
            .with_description("Demo user directory")
            .with_options(options)
            .extend_hooks(logging::logging_hooks()),
        dir,
        writes,
    )
    .build()
}

fn main() -> ExitCode {
    let dir = Arc::new(UserDirectory::seeded());

    // The command tree only depends on the registered operations, so it can be
    // built before the options that shape dispatch are known.
    let shape = build_registry(&dir, DispatchOptions::default());
    let matches = CliOptions::augment_args(cli::command(&shape, BIN_NAME)).get_matches();

    let opts = match CliOptions::from_arg_matches(&matches) {
        Ok(opts) => opts,
        Err(e) => e.exit(),
    };
    logging::init_tracing(opts.log_format);

    let registry = build_registry(&dir, opts.apply(DispatchOptions::default()));
    tracing::debug!(options = ?registry.options(), "registry ready");

    let result = cli::run(
        &registry,
        ExecutionContext::new(),
        &matches,
        &mut io::stdin().lock(),
        &mut io::stdout().lock(),
    );
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
