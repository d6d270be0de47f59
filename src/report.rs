//! Terminal presentation of a finished crew run.

use serde_json::{Value, json};

use crate::result::{PipelineResult, TaskState};

/// Per-task narration followed by the crew's final output.
///
/// `full_output` adds attempts, backend and the state-transition log.
pub fn render_text(result: &PipelineResult, full_output: bool) -> String {
    let mut out = String::new();

    for outcome in &result.outcomes {
        let title = outcome.task.title();
        match (&outcome.result, &outcome.failure, &outcome.blocked_by) {
            (Some(done), _, _) => {
                out.push_str(&format!(
                    "\n    '{title}' task completed!\n    Task: {}\n    Output: {}\n",
                    done.description,
                    done.raw
                ));
                if full_output {
                    out.push_str(&format!(
                        "    Backend: {} (attempts: {})\n",
                        done.backend.as_deref().unwrap_or("short-circuit"),
                        done.attempts
                    ));
                    if let Some(path) = &done.output_file {
                        out.push_str(&format!("    Written to: {}\n", path.display()));
                    }
                }
            }
            (None, Some(failure), _) => {
                out.push_str(&format!(
                    "\n    '{title}' task failed after {} attempt(s)!\n    Error [{}]: {}\n",
                    failure.attempts, failure.category, failure.reason
                ));
            }
            (None, None, Some(upstream)) => {
                out.push_str(&format!(
                    "\n    '{title}' task skipped: '{}' failed.\n",
                    upstream.title()
                ));
            }
            (None, None, None) => {
                out.push_str(&format!(
                    "\n    '{title}' task {}.\n",
                    outcome.state.label()
                ));
            }
        }
    }

    match result.final_output() {
        Some(last) => out.push_str(&format!(
            "\n    Crew completed!\n    Final Result Output: {}\n",
            last.raw
        )),
        None => out.push_str("\n    Crew finished without a final result.\n"),
    }

    if full_output {
        out.push_str("\nState transitions:\n");
        for transition in &result.transitions {
            out.push_str(&format!(
                "- {} {} {} -> {}\n",
                transition.at.format("%H:%M:%S%.3f"),
                transition.task,
                transition.from.label(),
                transition.to.label()
            ));
        }
        let elapsed = result.finished_at - result.started_at;
        out.push_str(&format!(
            "Elapsed: {} ms\n",
            elapsed.num_milliseconds().max(0)
        ));
    }

    out
}

/// Compact JSON by default: crew, success flag, final output and task states.
/// `full_output` serializes the whole result.
pub fn render_json(result: &PipelineResult, full_output: bool) -> Result<String, serde_json::Error> {
    let value = if full_output {
        serde_json::to_value(result)?
    } else {
        let states = result
            .outcomes
            .iter()
            .map(|o| (o.task.to_string(), json!(o.state.label())))
            .collect::<serde_json::Map<String, Value>>();
        json!({
            "crew": result.crew,
            "success": result.is_success(),
            "final_output": result.final_output().map(|r| r.raw.as_str()),
            "tasks": states,
        })
    };
    serde_json::to_string_pretty(&value)
}

pub fn summary_line(result: &PipelineResult) -> String {
    let count = |state: TaskState| {
        result
            .outcomes
            .iter()
            .filter(|o| o.state == state)
            .count()
    };
    format!(
        "crew '{}': {} completed, {} failed, {} pending",
        result.crew,
        count(TaskState::Completed),
        count(TaskState::Failed),
        count(TaskState::Pending)
    )
}
