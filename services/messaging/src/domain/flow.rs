//! Chatbot flow graph: definition format, validation and evaluation.
//!
//! Nodes live in an arena (`Vec<FlowNode>`) and refer to each other by index,
//! so cyclic graphs need no shared ownership.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static TEMPLATE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("template pattern is valid")
});

// ── Definition (JSON) ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FlowDefinition {
    /// Sent when a flow cannot continue.
    pub fallback: String,
    #[serde(default)]
    pub entry: Vec<EntryRuleDefinition>,
    pub nodes: Vec<FlowNodeDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryRuleDefinition {
    #[serde(rename = "match")]
    pub pattern: PatternDefinition,
    pub node: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatcherDefinition {
    #[serde(rename = "match")]
    pub pattern: PatternDefinition,
    pub next: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternDefinition {
    Exact(String),
    Keyword(String),
    Regex(String),
    Any,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowNodeDefinition {
    pub id: String,
    #[serde(default)]
    pub input: ExpectedInput,
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default)]
    pub matchers: Vec<MatcherDefinition>,
    #[serde(default)]
    pub default_next: Option<String>,
    #[serde(default = "default_wait_for_input")]
    pub wait_for_input: bool,
    #[serde(default)]
    pub capture: Option<String>,
}

fn default_wait_for_input() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum FlowDefinitionError {
    #[error("flow definition has no nodes")]
    Empty,
    #[error("duplicate flow node id: {0}")]
    DuplicateNode(String),
    #[error("{from} references unknown node {to}")]
    UnknownNode { from: String, to: String },
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

// ── Runtime graph ────────────────────────────────────────────────────────────

/// Kind of input a node waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpectedInput {
    Text,
    Button,
    #[default]
    Any,
}

impl ExpectedInput {
    fn accepts(self, kind: InputKind) -> bool {
        match self {
            Self::Any => true,
            Self::Text => kind == InputKind::Text,
            Self::Button => kind == InputKind::Button,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    /// Interactive reply; `text` carries the button id or title.
    Button,
}

/// An inbound message as the flow engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundInput {
    pub kind: InputKind,
    pub text: String,
}

impl InboundInput {
    pub fn text(text: &str) -> Self {
        Self {
            kind: InputKind::Text,
            text: text.to_owned(),
        }
    }

    pub fn button(text: &str) -> Self {
        Self {
            kind: InputKind::Button,
            text: text.to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
enum Pattern {
    /// Lowercased, trimmed.
    Exact(String),
    Keyword(Regex),
    Regex(Regex),
    Any,
}

impl Pattern {
    fn compile(definition: &PatternDefinition) -> Result<Self, FlowDefinitionError> {
        let compile = |pattern: String| {
            Regex::new(&pattern)
                .map_err(|source| FlowDefinitionError::InvalidRegex { pattern, source })
        };
        Ok(match definition {
            PatternDefinition::Exact(s) => Self::Exact(s.trim().to_lowercase()),
            PatternDefinition::Keyword(word) => Self::Keyword(compile(format!(
                r"(?i)\b{}\b",
                regex::escape(word.trim())
            ))?),
            PatternDefinition::Regex(pattern) => Self::Regex(compile(pattern.clone())?),
            PatternDefinition::Any => Self::Any,
        })
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Self::Exact(expected) => text.trim().to_lowercase() == *expected,
            Self::Keyword(re) | Self::Regex(re) => re.is_match(text),
            Self::Any => true,
        }
    }
}

#[derive(Debug, Clone)]
struct Edge {
    pattern: Pattern,
    target: usize,
}

#[derive(Debug, Clone)]
pub struct FlowNode {
    pub id: String,
    pub expected_input: ExpectedInput,
    pub responses: Vec<String>,
    pub wait_for_input: bool,
    pub capture: Option<String>,
    matchers: Vec<Edge>,
    default_next: Option<usize>,
}

impl FlowNode {
    fn has_outgoing(&self) -> bool {
        !self.matchers.is_empty() || self.default_next.is_some()
    }

    /// First matching edge (if the input kind fits), else `default_next`.
    fn next_for(&self, input: &InboundInput) -> Option<usize> {
        let matched = if self.expected_input.accepts(input.kind) {
            self.matchers
                .iter()
                .find(|edge| edge.pattern.matches(&input.text))
                .map(|edge| edge.target)
        } else {
            None
        };
        matched.or(self.default_next)
    }
}

/// Flow evaluation exceeded the hop cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("flow loop detected after {hops} node evaluations")]
pub struct FlowLoop {
    pub hops: usize,
}

/// Result of feeding one inbound message into the flow.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStep {
    /// No active flow and no entry rule matched.
    Unmatched,
    Advanced {
        /// `None` once the flow has ended.
        node_id: Option<String>,
        variables: BTreeMap<String, String>,
        responses: Vec<String>,
        hops: usize,
    },
}

#[derive(Debug, Clone)]
pub struct FlowGraph {
    nodes: Vec<FlowNode>,
    index: HashMap<String, usize>,
    entry: Vec<Edge>,
    fallback: String,
}

impl FlowGraph {
    pub fn from_definition(definition: FlowDefinition) -> Result<Self, FlowDefinitionError> {
        if definition.nodes.is_empty() {
            return Err(FlowDefinitionError::Empty);
        }

        let mut index = HashMap::with_capacity(definition.nodes.len());
        for (i, node) in definition.nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(FlowDefinitionError::DuplicateNode(node.id.clone()));
            }
        }
        let resolve = |from: &str, to: &str| {
            index
                .get(to)
                .copied()
                .ok_or_else(|| FlowDefinitionError::UnknownNode {
                    from: from.to_owned(),
                    to: to.to_owned(),
                })
        };

        let entry = definition
            .entry
            .iter()
            .map(|rule| {
                Ok(Edge {
                    pattern: Pattern::compile(&rule.pattern)?,
                    target: resolve("entry rule", &rule.node)?,
                })
            })
            .collect::<Result<Vec<_>, FlowDefinitionError>>()?;

        let mut nodes = Vec::with_capacity(definition.nodes.len());
        for node in &definition.nodes {
            let matchers = node
                .matchers
                .iter()
                .map(|m| {
                    Ok(Edge {
                        pattern: Pattern::compile(&m.pattern)?,
                        target: resolve(&node.id, &m.next)?,
                    })
                })
                .collect::<Result<Vec<_>, FlowDefinitionError>>()?;
            let default_next = node
                .default_next
                .as_deref()
                .map(|next| resolve(&node.id, next))
                .transpose()?;
            nodes.push(FlowNode {
                id: node.id.clone(),
                expected_input: node.input,
                responses: node.responses.clone(),
                wait_for_input: node.wait_for_input,
                capture: node.capture.clone(),
                matchers,
                default_next,
            });
        }

        Ok(Self {
            nodes,
            index,
            entry,
            fallback: definition.fallback,
        })
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Advance a conversation sitting at `current` by one inbound message.
    ///
    /// Every node evaluated counts one hop; exceeding `hop_cap` aborts with
    /// [`FlowLoop`]. An unknown `current` id is treated as no active flow.
    pub fn evaluate(
        &self,
        current: Option<&str>,
        variables: &BTreeMap<String, String>,
        input: &InboundInput,
        hop_cap: usize,
    ) -> Result<FlowStep, FlowLoop> {
        let mut variables = variables.clone();
        let mut hops = 0;
        let mut responses = Vec::new();

        let mut cursor = match current.and_then(|id| self.index.get(id).copied()) {
            None => match self.entry.iter().find(|rule| rule.pattern.matches(&input.text)) {
                Some(rule) => Some(rule.target),
                None => return Ok(FlowStep::Unmatched),
            },
            Some(i) => {
                hops += 1;
                let node = &self.nodes[i];
                if let Some(name) = &node.capture {
                    variables.insert(name.clone(), input.text.trim().to_owned());
                }
                match node.next_for(input) {
                    Some(next) => Some(next),
                    None => {
                        return Ok(FlowStep::Advanced {
                            node_id: None,
                            variables: BTreeMap::new(),
                            responses: vec![self.fallback.clone()],
                            hops,
                        });
                    }
                }
            }
        };

        while let Some(i) = cursor {
            if hops >= hop_cap {
                return Err(FlowLoop { hops });
            }
            hops += 1;
            let node = &self.nodes[i];
            responses.extend(node.responses.iter().map(|t| render(t, &variables)));

            if !node.wait_for_input {
                cursor = node.default_next;
            } else if node.has_outgoing() {
                return Ok(FlowStep::Advanced {
                    node_id: Some(node.id.clone()),
                    variables,
                    responses,
                    hops,
                });
            } else {
                cursor = None;
            }
        }

        // Flow ended; its variables go with it.
        Ok(FlowStep::Advanced {
            node_id: None,
            variables: BTreeMap::new(),
            responses,
            hops,
        })
    }
}

/// Substitute `{{name}}` placeholders; unknown names render empty.
pub fn render(template: &str, variables: &BTreeMap<String, String>) -> String {
    TEMPLATE_VAR
        .replace_all(template, |caps: &regex::Captures| {
            variables.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}
