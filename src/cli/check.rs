use crate::cli::CheckArgs;
use crate::config::Config;
use crate::credentials::{CredentialChain, ACCESS_PASSCODE, CLAUDE_MODEL, REQUIRED};
use crate::error::CredentialError;

pub fn execute(args: CheckArgs) -> anyhow::Result<()> {
    let config = Config::load_or_default(&args.config)?;
    let chain = CredentialChain::standard(&config.secrets_file)?;

    println!("Secrets file: {}", config.secrets_file.display());
    for key in REQUIRED {
        match chain.source_of(key) {
            Some(source) => println!("  ok       {} ({})", key, source),
            None => println!("  missing  {}", key),
        }
    }
    for key in [CLAUDE_MODEL, ACCESS_PASSCODE] {
        let source = chain.source_of(key).unwrap_or("unset");
        println!("  optional {} ({})", key, source);
    }

    let missing = chain.missing();
    if !missing.is_empty() {
        return Err(CredentialError::Missing(missing).into());
    }
    Ok(())
}
