// Streaming file search: walks a directory and reports matches as they are found

use futures::StreamExt;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use toolgate_core::{
    json_schema_boolean, json_schema_number, json_schema_object, json_schema_string, EventStream,
    LogLevel, StreamingTool, ToolDescriptor, ToolEvent, ToolgateError, ToolgateResult,
};
use walkdir::WalkDir;

const DEFAULT_MAX_RESULTS: usize = 1000;

// Events buffered between the walker thread and the consumer
const CHANNEL_CAPACITY: usize = 64;

/// Tool to find files by glob pattern, streaming each match
pub struct FileSearchTool {
    base_path: PathBuf,
}

impl FileSearchTool {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn prepare(&self, arguments: serde_json::Value) -> ToolgateResult<FileSearch> {
        let args: FileSearchArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolgateError::InvalidInput(e.to_string()))?;

        if args.pattern.trim().is_empty() {
            return Err(ToolgateError::InvalidInput(
                "Pattern is required and cannot be empty".to_string(),
            ));
        }

        let pattern = Pattern::new(&args.pattern)
            .map_err(|e| ToolgateError::InvalidInput(format!("Invalid glob pattern: {}", e)))?;

        Ok(FileSearch {
            root: self.base_path.join(&args.directory),
            pattern,
            args,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileSearchArgs {
    #[serde(default)]
    pattern: String,
    #[serde(default)]
    case_sensitive: bool,
    #[serde(default = "default_max_results", deserialize_with = "deserialize_max_results")]
    max_results: usize,
    #[serde(default = "default_recursive")]
    recursive: bool,
    #[serde(default = "default_directory")]
    directory: String,
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

// Advertised as a JSON number, so fractional values are floored
fn deserialize_max_results<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value < 0.0 {
        return Err(serde::de::Error::custom(format!(
            "maxResults must be a non-negative number, got {}",
            value
        )));
    }
    Ok(value.floor() as usize)
}

fn default_recursive() -> bool {
    true
}

fn default_directory() -> String {
    ".".to_string()
}

/// One validated search, run on a blocking thread
struct FileSearch {
    root: PathBuf,
    pattern: Pattern,
    args: FileSearchArgs,
}

impl FileSearch {
    /// Returns the number of matches delivered before the walk ended
    fn run(self, tx: mpsc::Sender<ToolEvent>, cancel: CancellationToken) -> usize {
        // A failed send means the consumer is gone
        let send = |event: ToolEvent| tx.blocking_send(event).is_ok();

        if !send(ToolEvent::progress(
            format!(
                "Searching for \"{}\" in {}...",
                self.args.pattern, self.args.directory
            ),
            None,
        )) {
            return 0;
        }

        if !self.root.is_dir() {
            send(ToolEvent::error(format!(
                "Directory not found: {}",
                self.args.directory
            )));
            return 0;
        }

        let options = MatchOptions {
            case_sensitive: self.args.case_sensitive,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        let mut walker = WalkDir::new(&self.root).sort_by_file_name();
        if !self.args.recursive {
            walker = walker.max_depth(1);
        }

        let mut total = 0usize;
        let mut truncated = false;

        for entry in walker {
            if cancel.is_cancelled() {
                tracing::debug!(pattern = %self.args.pattern, "File search cancelled");
                return total;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if !send(ToolEvent::log(LogLevel::Warn, format!("Skipping entry: {}", e))) {
                        return total;
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            if !self.pattern.matches_with(&relative, options) {
                continue;
            }

            if total >= self.args.max_results {
                truncated = true;
                send(ToolEvent::log(
                    LogLevel::Warn,
                    format!(
                        "Maximum results ({}) reached. Stopping search.",
                        self.args.max_results
                    ),
                ));
                break;
            }

            if !send(ToolEvent::log(LogLevel::Info, relative)) {
                return total;
            }
            total += 1;
        }

        tracing::debug!(pattern = %self.args.pattern, total, "File search completed");

        send(ToolEvent::success(serde_json::json!({
            "message": "Search completed",
            "pattern": self.args.pattern,
            "directory": self.args.directory,
            "totalResults": total,
            "maxResults": self.args.max_results,
            "truncated": truncated,
        })));
        total
    }
}

impl StreamingTool for FileSearchTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "file_search",
            "Search for files matching pattern with live results",
            json_schema_object(
                serde_json::json!({
                    "pattern": json_schema_string("The glob pattern to search for (e.g., src/**/*.rs)"),
                    "caseSensitive": json_schema_boolean("Whether the search should be case-sensitive", false),
                    "maxResults": json_schema_number("Maximum number of results to return", DEFAULT_MAX_RESULTS as u64),
                    "recursive": json_schema_boolean("Whether to search recursively", true),
                    "directory": json_schema_string("Directory to search, relative to the server root"),
                }),
                vec!["pattern"],
            ),
        )
    }

    fn call_stream(&self, arguments: serde_json::Value, cancel: CancellationToken) -> EventStream {
        let search = match self.prepare(arguments) {
            Ok(search) => search,
            Err(err) => {
                return futures::stream::once(futures::future::ready(ToolEvent::error(
                    err.to_string(),
                )))
                .boxed();
            }
        };

        // The walk starts on first poll; dropping `rx` or cancelling stops it
        Box::pin(async_stream::stream! {
            let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
            tokio::task::spawn_blocking(move || search.run(tx, cancel));

            while let Some(event) = rx.recv().await {
                yield event;
            }
        })
    }
}
