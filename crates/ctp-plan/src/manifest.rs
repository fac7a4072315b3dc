// SPDX-License-Identifier: MIT OR Apache-2.0
//! Manifest template and inference.
//!
//! `manifest_template` builds the baseline v2 manifest;
//! `infer_from_plan` enriches it from plan and requirements text,
//! recording every inference with its source and confidence so a human
//! can audit what the machine decided.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::LazyLock;
use tracing::debug;

/// API version of generated manifests.
pub const MANIFEST_API_VERSION: &str = "context-plane.io/v1alpha2";

/// Core field paths counted toward the low-confidence warning.
const CORE_FIELDS: &[&str] = &[
    "spec.project.description",
    "spec.business.criticality",
    "spec.requirements.availability",
    "spec.targets[0].name",
    "spec.business.owner",
    "guidance.constraints",
    "strategy.objectives[0].description",
];

/// Minimum core inferences before the outcome is considered confident.
const MIN_CORE_INFERENCES: usize = 3;

static EXPLICIT_CRITICALITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:criticality|severity|priority)\s*[:\-]?\s*(critical|high|medium|low)")
        .expect("static pattern")
});
static SEV1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bp1\b|\bp0\b|\bsev-?1\b|\bcritical\b").expect("static pattern"));
static P2: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bp2\b|\bhigh\b").expect("static pattern"));
static P3: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bp3\b|\bmedium\b").expect("static pattern"));
static P4: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bp4\b").expect("static pattern"));
static AVAILABILITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2,3}(?:\.\d+)?)\s*%?\s*(?:availability|uptime|slo)").expect("static pattern")
});
static LATENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:p99|99th|latency)[^0-9]{0,20}(\d+(?:\.\d+)?)\s*(ms|s|sec|seconds)")
        .expect("static pattern")
});
static THROUGHPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(?:rps|req/s|requests/s|qps)").expect("static pattern")
});
static ERROR_BUDGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"error\s*budget[^0-9]{0,20}(\d+(?:\.\d+)?)\s*%?").expect("static pattern")
});
static CHANNEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(#[-a-zA-Z0-9_]+)").expect("static pattern"));
static OWNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:owner|team)[:\s]+([a-zA-Z0-9_-]+)").expect("static pattern"));
static RISK_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(risk|blocker)\b").expect("static pattern"));

/// One recorded inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    /// Dot-path of the manifest field that was set.
    pub field_path: String,
    /// Value that was written.
    pub value: Value,
    /// Where it came from, e.g. `plan:heading_plus_first_meaningful_line`.
    pub source: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Outcome of inference over a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceOutcome {
    /// The enriched manifest.
    pub manifest: Value,
    /// Everything that was inferred, in application order.
    pub inferences: Vec<Inference>,
    /// Warnings (e.g. the low-confidence warning).
    pub warnings: Vec<String>,
    /// How many core fields were inferred.
    pub core_inferred_count: usize,
}

/// Build a baseline v2 manifest payload for `name`.
pub fn manifest_template(name: &str) -> Value {
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let display_name = display_name_for(name);
    json!({
        "apiVersion": MANIFEST_API_VERSION,
        "kind": "ContextManifest",
        "metadata": {
            "name": name,
            "owners": [{"team": "engineering", "slack": "#alerts", "email": "team@example.com"}],
            "changelog": [
                {
                    "version": "2.0",
                    "date": today,
                    "author": "you",
                    "summary": format!("Initial v2.0 manifest for {name}"),
                    "changes": ["Initial v2.0 manifest"],
                }
            ],
            "links": {
                "repo": format!("https://github.com/your-org/{name}"),
            },
        },
        "spec": {
            "project": {
                "id": name,
                "name": display_name,
                "description": format!("{display_name} service - update this description."),
            },
            "business": {
                "criticality": "medium",
                "owner": "engineering",
                "value": "enabler",
            },
            "requirements": {
                "availability": "99.9",
                "latencyP99": "500ms",
                "throughput": "100rps",
                "errorBudget": "0.1",
            },
            "risks": [
                {
                    "type": "availability",
                    "description": "Example risk - update or remove",
                    "priority": "P3",
                    "mitigation": "Example mitigation",
                },
            ],
            "targets": [
                {
                    "kind": "Deployment",
                    "name": name,
                    "namespace": "default",
                },
            ],
            "observability": {
                "traceSampling": 1.0,
                "metricsInterval": "30s",
                "alertChannels": ["#alerts"],
                "logLevel": "info",
            },
        },
        "strategy": {
            "objectives": [
                {
                    "id": "OBJ-001",
                    "description": "Example objective - update with real business goal",
                    "keyResults": [
                        {
                            "metricKey": "availability",
                            "unit": "%",
                            "target": 99.9,
                            "targetOperator": "gte",
                            "window": "30d",
                        }
                    ],
                }
            ],
            "tactics": [
                {
                    "id": "TAC-001",
                    "description": "Example tactic - update with real action item",
                    "status": "planned",
                    "linkedObjectives": ["OBJ-001"],
                }
            ],
        },
        "guidance": {
            "focus": {
                "areas": ["reliability"],
                "reason": "Focus on core stability",
            },
            "constraints": [],
            "preferences": [],
            "questions": [],
        },
        "insights": [],
    })
}

fn display_name_for(name: &str) -> String {
    name.split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_metadata_line(line: &str) -> bool {
    let lowered = line.trim().to_lowercase();
    lowered.starts_with("**date:")
        || lowered.starts_with("**status:")
        || lowered.starts_with("**scope:")
        || lowered.starts_with("**requirements source:")
        || lowered == "---"
        || lowered == "___"
}

fn truncated(text: &str, cap: usize) -> String {
    if text.len() > cap {
        let mut end = cap;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    } else {
        text.to_string()
    }
}

/// Infer manifest fields from plan and requirements text.
pub fn infer_from_plan(
    mut manifest: Value,
    plan_text: &str,
    requirements_text: &str,
    project_root: Option<&str>,
    emit_guidance_questions: bool,
) -> InferenceOutcome {
    let text = format!("{plan_text}\n{requirements_text}");
    let lowered = text.to_lowercase();
    let mut inferences: Vec<Inference> = Vec::new();
    let mut warnings = Vec::new();

    let plan_lines: Vec<&str> = plan_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    // Description: heading plus first meaningful prose line.
    let heading = plan_lines
        .iter()
        .find(|l| l.starts_with("# "))
        .map(|l| l[2..].trim().to_string());
    let first_prose = plan_lines
        .iter()
        .find(|l| !l.starts_with('#') && !is_metadata_line(l) && l.len() >= 20)
        .map(|l| l.to_string());
    let description = match (&heading, &first_prose) {
        (Some(h), Some(d)) => Some(format!("{h}. {}", truncated(d, 220))),
        (Some(h), None) => Some(h.clone()),
        (None, Some(d)) => Some(d.clone()),
        (None, None) => None,
    };
    if let Some(description) = description {
        let capped = truncated(&description, 300);
        manifest["spec"]["project"]["description"] = json!(capped);
        inferences.push(Inference {
            field_path: "spec.project.description".to_string(),
            value: json!(capped),
            source: "plan:heading_plus_first_meaningful_line".to_string(),
            confidence: 0.9,
        });
    }

    // Criticality from severity keywords.
    let criticality = if let Some(caps) = EXPLICIT_CRITICALITY.captures(&lowered) {
        Some(caps[1].to_string())
    } else if SEV1.is_match(&lowered) || P2.is_match(&lowered) {
        Some("high".to_string())
    } else if P3.is_match(&lowered) {
        Some("medium".to_string())
    } else if P4.is_match(&lowered) {
        Some("low".to_string())
    } else {
        None
    };
    if let Some(criticality) = criticality {
        manifest["spec"]["business"]["criticality"] = json!(criticality);
        inferences.push(Inference {
            field_path: "spec.business.criticality".to_string(),
            value: json!(criticality),
            source: "plan+requirements:contextual_criticality_detection".to_string(),
            confidence: 0.82,
        });
    }

    // SLO numbers.
    if let Some(caps) = AVAILABILITY.captures(&lowered) {
        let availability = caps[1].to_string();
        manifest["spec"]["requirements"]["availability"] = json!(availability);
        inferences.push(Inference {
            field_path: "spec.requirements.availability".to_string(),
            value: json!(availability),
            source: "requirements:regex".to_string(),
            confidence: 0.8,
        });
    }
    if let Some(caps) = LATENCY.captures(&lowered) {
        let latency = format!("{}{}", &caps[1], &caps[2]);
        manifest["spec"]["requirements"]["latencyP99"] = json!(latency);
        inferences.push(Inference {
            field_path: "spec.requirements.latencyP99".to_string(),
            value: json!(latency),
            source: "requirements:regex".to_string(),
            confidence: 0.75,
        });
    }
    if let Some(caps) = THROUGHPUT.captures(&lowered) {
        let throughput = format!("{}rps", &caps[1]);
        manifest["spec"]["requirements"]["throughput"] = json!(throughput);
        inferences.push(Inference {
            field_path: "spec.requirements.throughput".to_string(),
            value: json!(throughput),
            source: "requirements:regex".to_string(),
            confidence: 0.72,
        });
    }
    if let Some(caps) = ERROR_BUDGET.captures(&lowered) {
        let error_budget = caps[1].to_string();
        manifest["spec"]["requirements"]["errorBudget"] = json!(error_budget);
        inferences.push(Inference {
            field_path: "spec.requirements.errorBudget".to_string(),
            value: json!(error_budget),
            source: "requirements:regex".to_string(),
            confidence: 0.7,
        });
    }

    // Alert channels.
    let mut channels: Vec<String> = CHANNEL
        .captures_iter(&text)
        .map(|c| c[1].to_string())
        .collect();
    channels.sort();
    channels.dedup();
    if !channels.is_empty() {
        manifest["spec"]["observability"]["alertChannels"] = json!(channels);
        inferences.push(Inference {
            field_path: "spec.observability.alertChannels".to_string(),
            value: json!(channels),
            source: "plan+requirements:channel_extraction".to_string(),
            confidence: 0.7,
        });
    }

    // Owner.
    if let Some(caps) = OWNER.captures(&lowered) {
        let owner = caps[1].to_string();
        manifest["spec"]["business"]["owner"] = json!(owner);
        manifest["metadata"]["owners"][0]["team"] = json!(owner);
        inferences.push(Inference {
            field_path: "spec.business.owner".to_string(),
            value: json!(owner),
            source: "plan+requirements:regex".to_string(),
            confidence: 0.65,
        });
    }

    // Target name from the project root basename.
    if let Some(root) = project_root {
        let basename = root
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(root)
            .replace('_', "-");
        if !basename.is_empty() {
            manifest["spec"]["targets"][0]["name"] = json!(basename);
            inferences.push(Inference {
                field_path: "spec.targets[0].name".to_string(),
                value: json!(basename),
                source: "project_root:basename".to_string(),
                confidence: 0.8,
            });
        }
    }

    // Risks from lines mentioning risk/blocker.
    let risks: Vec<String> = plan_lines
        .iter()
        .filter(|l| RISK_WORD.is_match(&l.to_lowercase()))
        .take(3)
        .map(|l| truncated(l, 180))
        .collect();
    if !risks.is_empty() {
        let risk_objects: Vec<Value> = risks
            .iter()
            .map(|r| {
                json!({
                    "type": "availability",
                    "description": r,
                    "priority": "P2",
                    "mitigation": "Define mitigation in implementation plan",
                })
            })
            .collect();
        manifest["spec"]["risks"] = json!(risk_objects);
        inferences.push(Inference {
            field_path: "spec.risks".to_string(),
            value: json!(risk_objects),
            source: "plan:risk_line_extraction".to_string(),
            confidence: 0.65,
        });
    }

    // Guardrails become blocking constraints.
    let guardrails: Vec<String> = plan_lines
        .iter()
        .filter(|l| {
            let lowered = l.to_lowercase();
            lowered.starts_with("- do not ") || lowered.starts_with("- keep ")
        })
        .take(5)
        .map(|l| l.trim_start_matches(['-', ' ']).to_string())
        .collect();
    if !guardrails.is_empty() {
        let constraints: Vec<Value> = guardrails
            .iter()
            .enumerate()
            .map(|(idx, rule)| {
                json!({
                    "id": format!("C-PLAN-{:03}", idx + 1),
                    "rule": rule,
                    "severity": "blocking",
                    "rationale": "Imported from implementation plan guardrails",
                    "appliesTo": [],
                })
            })
            .collect();
        let ids: Vec<Value> = constraints.iter().map(|c| c["id"].clone()).collect();
        manifest["guidance"]["constraints"] = json!(constraints);
        inferences.push(Inference {
            field_path: "guidance.constraints".to_string(),
            value: json!(ids),
            source: "plan:guardrail_to_constraint".to_string(),
            confidence: 0.88,
        });
    }

    // Objectives from ### Goals / ### Execution Scope bullets.
    let goals = collect_goal_bullets(&plan_lines);
    if let Some(first_goal) = goals.first() {
        let availability_target = manifest["spec"]["requirements"]["availability"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(99.9);
        let description = truncated(first_goal, 180);
        manifest["strategy"]["objectives"] = json!([
            {
                "id": "OBJ-PLAN-001",
                "description": description,
                "keyResults": [
                    {
                        "metricKey": "availability",
                        "unit": "%",
                        "target": availability_target,
                        "targetOperator": "gte",
                        "window": "30d",
                    }
                ],
            }
        ]);
        inferences.push(Inference {
            field_path: "strategy.objectives[0].description".to_string(),
            value: json!(description),
            source: "plan:goals_or_execution_scope_extraction".to_string(),
            confidence: 0.8,
        });
    }

    // Open questions.
    if emit_guidance_questions {
        let questions: Vec<String> = plan_lines
            .iter()
            .filter(|l| l.ends_with('?'))
            .take(5)
            .map(|l| truncated(l, 220))
            .collect();
        if !questions.is_empty() {
            let question_objects: Vec<Value> = questions
                .iter()
                .enumerate()
                .map(|(idx, q)| {
                    json!({
                        "id": format!("Q-{:03}", idx + 1),
                        "question": q,
                        "status": "open",
                        "priority": "medium",
                    })
                })
                .collect();
            let ids: Vec<Value> = question_objects.iter().map(|q| q["id"].clone()).collect();
            manifest["guidance"]["questions"] = json!(question_objects);
            inferences.push(Inference {
                field_path: "guidance.questions".to_string(),
                value: json!(ids),
                source: "plan:question_line_extraction".to_string(),
                confidence: 0.6,
            });
        }
    }

    let core_inferred_count = inferences
        .iter()
        .filter(|i| CORE_FIELDS.contains(&i.field_path.as_str()))
        .count();
    if core_inferred_count < MIN_CORE_INFERENCES {
        warnings.push(
            "Low-confidence inference: fewer than 3 core fields were inferred from inputs."
                .to_string(),
        );
    }
    debug!(
        inferences = inferences.len(),
        core = core_inferred_count,
        "manifest inference complete"
    );

    InferenceOutcome {
        manifest,
        inferences,
        warnings,
        core_inferred_count,
    }
}

/// Bullets under `### Goals` or `### Execution Scope` headings.
fn collect_goal_bullets(plan_lines: &[&str]) -> Vec<String> {
    let mut goals = Vec::new();
    let mut collecting = false;
    for line in plan_lines {
        let lowered = line.to_lowercase();
        if lowered.starts_with("### goals") || lowered.starts_with("### execution scope") {
            collecting = true;
            continue;
        }
        if collecting && line.starts_with("### ") {
            collecting = false;
        }
        if collecting && line.starts_with("- ") {
            goals.push(line.trim_start_matches(['-', ' ']).to_string());
        }
    }
    goals
}
