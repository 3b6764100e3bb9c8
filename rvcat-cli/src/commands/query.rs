//! RVCAT query commands.
//!
//! Each command starts the configured worker, waits for it to become ready
//! and imports the engine module before issuing its calls. Results go to
//! stdout; progress and diagnostics go to the log.

use rvcat_bridge::command::Selection;
use rvcat_bridge::session::RvcatApi;
use serde_json::Value;
use tracing::info;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the analyze command.
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    pub processor: String,
    pub program: String,
    pub iterations: u32,
    pub window_size: u32,
    pub rob_size: Option<u32>,
    pub timeline: bool,
    pub show_program: bool,
}

impl AnalyzeArgs {
    fn selection(&self) -> Selection {
        Selection {
            processor: Some(self.processor.clone()),
            program: Some(self.program.clone()),
            iterations: self.iterations,
            window_size: self.window_size,
        }
    }
}

/// List the available processor configurations.
pub fn run_processors(verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("processors");

    let names = runner.block_on(async {
        let api = runner.connect().await?;
        Ok::<_, CliError>(api.processors().await?)
    })?;

    print_names(&names);
    Ok(())
}

/// List the available programs.
pub fn run_programs(verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("programs");

    let names = runner.block_on(async {
        let api = runner.connect().await?;
        Ok::<_, CliError>(api.programs().await?)
    })?;

    print_names(&names);
    Ok(())
}

/// Run the scheduler analysis for one processor/program pair.
pub fn run_analyze(args: AnalyzeArgs, verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("analyze");

    runner.block_on(async {
        let api = runner.connect().await?;
        analyze(&api, &args).await
    })
}

async fn analyze(api: &RvcatApi, args: &AnalyzeArgs) -> Result<(), CliError> {
    info!(
        processor = %args.processor,
        program = %args.program,
        iterations = args.iterations,
        window_size = args.window_size,
        "Preparing analysis"
    );
    api.prepare(args.selection()).await?;

    if let Some(size) = args.rob_size {
        api.set_rob_size(size).await?;
    }

    if args.show_program {
        println!("{}", api.show_program().await?);
        println!();
    }

    let analysis = api.run_analysis().await?;
    println!("{}", render_analysis(&analysis));

    if args.timeline {
        println!();
        println!("{}", api.timeline(args.iterations).await?);
    }

    Ok(())
}

fn print_names(names: &[String]) {
    if names.is_empty() {
        println!("(none)");
        return;
    }
    for name in names {
        println!("{}", name);
    }
}

/// Pretty-print structured results; pass plain text through unchanged.
fn render_analysis(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "(no result)".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selection_from_args() {
        let args = AnalyzeArgs {
            processor: "baseline".to_string(),
            program: "saxpy".to_string(),
            iterations: 3,
            window_size: 50,
            rob_size: None,
            timeline: false,
            show_program: false,
        };
        let selection = args.selection();
        assert_eq!(selection.processor.as_deref(), Some("baseline"));
        assert_eq!(selection.program.as_deref(), Some("saxpy"));
        assert_eq!(selection.iterations, 3);
        assert_eq!(selection.window_size, 50);
    }

    #[test]
    fn test_render_analysis() {
        assert_eq!(render_analysis(&json!("plain text")), "plain text");
        assert_eq!(render_analysis(&Value::Null), "(no result)");
        assert!(render_analysis(&json!({"cycles": 4})).contains("\"cycles\": 4"));
    }
}
