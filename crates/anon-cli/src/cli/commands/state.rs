use crate::cli::args::StateArgs;
use crate::exit_codes::SUCCESS;
use anon_core::StateStore;
use anyhow::Context;

fn open(args: &StateArgs) -> anyhow::Result<StateStore> {
    StateStore::open(&args.state)
        .with_context(|| format!("failed to open state store {}", args.state.display()))
}

pub fn status(args: StateArgs) -> anyhow::Result<i32> {
    let store = open(&args)?;
    match store.initialized_at()? {
        Some(at) => println!("initialized at {}", at.to_rfc3339()),
        None if store.is_initialized()? => println!("initialized"),
        None => println!("uninitialized"),
    }
    Ok(SUCCESS)
}

pub fn reset(args: StateArgs) -> anyhow::Result<i32> {
    open(&args)?.reset()?;
    tracing::info!(state = %args.state.display(), "initialization flag cleared");
    println!("uninitialized");
    Ok(SUCCESS)
}
