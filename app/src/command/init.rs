use mirage_config::Config;
use std::path::PathBuf;

/// Writes a starter config, `~/mirage/config.json` unless a path is given.
#[derive(Debug, Clone, Copy)]
pub struct InitStrategy;

impl super::CommandStrategy for InitStrategy {
    type Input = Option<PathBuf>;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let path = Config::create_config(input.as_deref())?;
        println!("Edit {} to set the LLM provider, model and API key.", path.display());
        Ok(())
    }
}
