//! Engine commands as a closed, validated vocabulary.
//!
//! Every request the host can issue to the RVCAT engine is one variant of
//! [`Command`]. Parameters are validated before the command is rendered to
//! engine text, and user-supplied values are only ever embedded as quoted
//! literals, never spliced into the command text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Longest accepted processor or program name.
pub const MAX_NAME_LEN: usize = 128;

/// Command rejected before reaching the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// A resource name is empty, too long, or has forbidden characters.
    #[error("invalid {field} name '{value}': {reason}")]
    InvalidName {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    /// A numeric parameter is out of range.
    #[error("invalid {field}: {reason}")]
    InvalidParameter {
        field: &'static str,
        reason: String,
    },

    /// An imported definition is not a JSON object.
    #[error("{field} definition must be a JSON object")]
    NotAnObject { field: &'static str },
}

/// Scheduler setup applied before analysis commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Processor configuration to load, if any.
    pub processor: Option<String>,
    /// Program to load, if any. The scheduler is only set up with a program.
    pub program: Option<String>,
    /// Loop iterations to simulate.
    pub iterations: u32,
    /// Reorder-buffer (instruction window) size.
    pub window_size: u32,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            processor: None,
            program: None,
            iterations: 1,
            window_size: 100,
        }
    }
}

/// Every command the host may send to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    // ---- session setup ----
    /// Import the engine module.
    ImportRvcat,
    /// Load processor, program and scheduler parameters in one step.
    Prepare(Selection),
    /// Select a processor configuration by name.
    LoadProcessor { name: String },
    /// Select a program by name.
    LoadProgram { name: String },
    /// Change the reorder-buffer size.
    SetRobSize { size: u32 },

    // ---- catalogue ----
    /// List the available processors as JSON.
    ListProcessors,
    /// List the available programs as JSON.
    ListPrograms,
    /// Register a processor definition.
    ImportProcessor { config: Value },
    /// Register a program definition.
    ImportProgram { config: Value },

    // ---- inspection ----
    /// Program listing.
    ShowProgram,
    /// Annotated program execution listing.
    ShowExecution,
    /// Current processor as JSON.
    ProcessorJson,
    /// Current program as JSON.
    ProgramJson,
    /// Recurrent critical paths as a Graphviz document.
    CriticalPathsGraphviz,
    /// Static performance analysis report.
    StaticPerformance,

    // ---- simulation ----
    /// Scheduler analysis as JSON.
    RunAnalysis,
    /// Execution timeline for the given number of iterations.
    Timeline { iterations: u32 },
}

impl Command {
    /// Checks all parameters without rendering.
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Command::Prepare(selection) => {
                if let Some(name) = &selection.processor {
                    validate_name("processor", name)?;
                }
                if let Some(name) = &selection.program {
                    validate_name("program", name)?;
                }
                validate_positive("iterations", selection.iterations)?;
                validate_positive("window_size", selection.window_size)
            }
            Command::LoadProcessor { name } => validate_name("processor", name),
            Command::LoadProgram { name } => validate_name("program", name),
            Command::SetRobSize { size } => validate_positive("size", *size),
            Command::Timeline { iterations } => validate_positive("iterations", *iterations),
            Command::ImportProcessor { config } => validate_object("processor", config),
            Command::ImportProgram { config } => validate_object("program", config),
            Command::ImportRvcat
            | Command::ListProcessors
            | Command::ListPrograms
            | Command::ShowProgram
            | Command::ShowExecution
            | Command::ProcessorJson
            | Command::ProgramJson
            | Command::CriticalPathsGraphviz
            | Command::StaticPerformance
            | Command::RunAnalysis => Ok(()),
        }
    }

    /// Validates the command and renders it to engine text.
    pub fn render(&self) -> Result<String, CommandError> {
        self.validate()?;

        let text = match self {
            Command::ImportRvcat => "import rvcat".to_string(),
            Command::Prepare(selection) => render_prepare(selection),
            Command::LoadProcessor { name } => {
                format!("rvcat._processor.load_processor({})", quote(name))
            }
            Command::LoadProgram { name } => {
                format!("rvcat._program.load_program({})", quote(name))
            }
            Command::SetRobSize { size } => format!("rvcat.set_rob_size({})", size),
            Command::ListProcessors => {
                "import rvcat\nrvcat._processor.list_processors_json()".to_string()
            }
            Command::ListPrograms => "import rvcat\nrvcat._program.list_programs_json()".to_string(),
            Command::ImportProcessor { config } => format!(
                "rvcat._processor.import_processor_json({})",
                quote(&config.to_string())
            ),
            Command::ImportProgram { config } => format!(
                "rvcat._program.import_program_json({})",
                quote(&config.to_string())
            ),
            Command::ShowProgram => "str(rvcat._program)".to_string(),
            Command::ShowExecution => "rvcat._program.show_code()".to_string(),
            Command::ProcessorJson => "rvcat._processor.json()".to_string(),
            Command::ProgramJson => "rvcat._program.json()".to_string(),
            Command::CriticalPathsGraphviz => {
                "rvcat._program.get_recurrent_paths_graphviz()".to_string()
            }
            Command::StaticPerformance => "rvcat._program.show_performance_analysis()".to_string(),
            Command::RunAnalysis => "rvcat._scheduler.format_analysis_json()".to_string(),
            Command::Timeline { iterations } => {
                format!("rvcat._scheduler.format_timeline(niters={})", iterations)
            }
        };

        Ok(text)
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::ImportRvcat => "import_rvcat",
            Command::Prepare(_) => "prepare",
            Command::LoadProcessor { .. } => "load_processor",
            Command::LoadProgram { .. } => "load_program",
            Command::SetRobSize { .. } => "set_rob_size",
            Command::ListProcessors => "list_processors",
            Command::ListPrograms => "list_programs",
            Command::ImportProcessor { .. } => "import_processor",
            Command::ImportProgram { .. } => "import_program",
            Command::ShowProgram => "show_program",
            Command::ShowExecution => "show_execution",
            Command::ProcessorJson => "processor_json",
            Command::ProgramJson => "program_json",
            Command::CriticalPathsGraphviz => "critical_paths_graphviz",
            Command::StaticPerformance => "static_performance",
            Command::RunAnalysis => "run_analysis",
            Command::Timeline { .. } => "timeline",
        }
    }
}

fn render_prepare(selection: &Selection) -> String {
    let mut text = String::from("import rvcat\n");
    if let Some(processor) = &selection.processor {
        text.push_str(&format!(
            "rvcat._processor.load_processor({})\n",
            quote(processor)
        ));
    }
    if let Some(program) = &selection.program {
        text.push_str(&format!(
            "rvcat._program.load_program({})\n",
            quote(program)
        ));
        text.push_str(&format!(
            "rvcat._scheduler.load_program(rvcat._program, iterations={}, window_size={})\n",
            selection.iterations, selection.window_size
        ));
    }
    text
}

/// Quotes a value as a string literal.
///
/// A JSON string literal is also a valid engine string literal, so
/// quotes, backslashes and control characters are escaped.
fn quote(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn validate_name(field: &'static str, value: &str) -> Result<(), CommandError> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.len() > MAX_NAME_LEN {
        Some("too long")
    } else if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        Some("only letters, digits, '_', '-' and '.' are allowed")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CommandError::InvalidName {
            field,
            value: value.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn validate_positive(field: &'static str, value: u32) -> Result<(), CommandError> {
    if value == 0 {
        return Err(CommandError::InvalidParameter {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

fn validate_object(field: &'static str, value: &Value) -> Result<(), CommandError> {
    if !value.is_object() {
        return Err(CommandError::NotAnObject { field });
    }
    Ok(())
}
