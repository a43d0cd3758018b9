//! Engine command construction.
//!
//! `ENGINE_ARGS` is parsed once at startup into an [`EngineTemplate`]; each
//! claimed job renders it into a complete [`EngineCommand`] before anything
//! is spawned.

use renderfarm_client::{ENV_JOB_UID, ENV_STORE_URL, ENV_WORKER};
use renderfarm_db::models::render_job::RenderJob;

/// Movie render invocation used when `ENGINE_ARGS` is unset.
pub const DEFAULT_ENGINE_ARGS: &str = "{map} -JobId={uid} -LevelSequence={sequence} \
     -MoviePipelineConfig={config} -game -windowed -resX=1280 -resY=720 \
     -StdOut -FullStdOutLogOutput";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("unclosed '{{' in argument {0:?}")]
    Unclosed(String),

    #[error("{{{0}}} rendered to an empty value")]
    EmptyValue(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Uid,
    Map,
    Sequence,
    Config,
    Worker,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "uid" => Some(Field::Uid),
            "map" => Some(Field::Map),
            "sequence" => Some(Field::Sequence),
            "config" => Some(Field::Config),
            "worker" => Some(Field::Worker),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Field::Uid => "uid",
            Field::Map => "map",
            Field::Sequence => "sequence",
            Field::Config => "config",
            Field::Worker => "worker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Field),
}

/// Parsed `ENGINE_PROGRAM` + `ENGINE_ARGS`.
#[derive(Debug, Clone)]
pub struct EngineTemplate {
    program: String,
    args: Vec<Vec<Segment>>,
}

/// A fully rendered engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(&'static str, String)>,
}

impl EngineTemplate {
    /// Parse a whitespace separated argument template.
    pub fn parse(program: &str, args: &str) -> Result<Self, TemplateError> {
        let args = args
            .split_whitespace()
            .map(parse_arg)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            program: program.trim().to_string(),
            args,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Render the command for one job.
    pub fn render(
        &self,
        job: &RenderJob,
        worker: &str,
        store_url: &str,
    ) -> Result<EngineCommand, TemplateError> {
        let uid = job.uid.to_string();
        let value = |field: Field| -> Result<&str, TemplateError> {
            let value = match field {
                Field::Uid => uid.as_str(),
                Field::Map => job.map_ref.as_str(),
                Field::Sequence => job.sequence_ref.as_str(),
                Field::Config => job.config_ref.as_str(),
                Field::Worker => worker,
            };
            if value.trim().is_empty() {
                Err(TemplateError::EmptyValue(field.name()))
            } else {
                Ok(value)
            }
        };

        let mut args = Vec::with_capacity(self.args.len());
        for segments in &self.args {
            let mut arg = String::new();
            for segment in segments {
                match segment {
                    Segment::Literal(text) => arg.push_str(text),
                    Segment::Placeholder(field) => arg.push_str(value(*field)?),
                }
            }
            args.push(arg);
        }

        Ok(EngineCommand {
            program: self.program.clone(),
            args,
            env: vec![
                (ENV_JOB_UID, uid.clone()),
                (ENV_STORE_URL, store_url.to_string()),
                (ENV_WORKER, worker.to_string()),
            ],
        })
    }
}

fn parse_arg(raw: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = raw;

    while let Some(open) = rest.find('{') {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| TemplateError::Unclosed(raw.to_string()))?;
        let name = &after[..close];
        let field =
            Field::parse(name).ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
        segments.push(Segment::Placeholder(field));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}
