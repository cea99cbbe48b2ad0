use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::TotpConfig;
use crate::state::Parameter;

/// Where a block finds the page it starts on.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BlockUrl {
    Fixed(String),
    /// Resolved from the parameter table at execution time.
    Parameter(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "block_type", rename_all = "snake_case")]
pub enum BlockKind {
    GotoUrl {
        url: BlockUrl,
    },
    Navigation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<BlockUrl>,
        navigation_goal: String,
        #[serde(default, skip_serializing_if = "TotpConfig::is_empty")]
        totp: TotpConfig,
    },
    Extraction {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<BlockUrl>,
        data_extraction_goal: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_schema: Option<Value>,
    },
    /// Navigation and extraction in one unit; used as a loop body.
    Task {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<BlockUrl>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        navigation_goal: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_extraction_goal: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_schema: Option<Value>,
        #[serde(default, skip_serializing_if = "TotpConfig::is_empty")]
        totp: TotpConfig,
    },
    ForLoop {
        loop_over: String,
        loop_block: Box<Block>,
    },
}

impl BlockKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::GotoUrl { .. } => "goto_url",
            BlockKind::Navigation { .. } => "navigation",
            BlockKind::Extraction { .. } => "extraction",
            BlockKind::Task { .. } => "task",
            BlockKind::ForLoop { .. } => "for_loop",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub label: String,
    #[serde(flatten)]
    pub kind: BlockKind,
    pub output_parameter: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl Block {
    fn new(label: impl Into<String>, kind: BlockKind) -> Self {
        let label = label.into();
        Self {
            output_parameter: format!("{label}_output"),
            label,
            kind,
            parameters: Vec::new(),
            continue_on_failure: false,
        }
    }

    pub fn goto_url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(
            label,
            BlockKind::GotoUrl {
                url: BlockUrl::Fixed(url.into()),
            },
        )
    }

    pub fn navigation(
        label: impl Into<String>,
        url: Option<BlockUrl>,
        navigation_goal: impl Into<String>,
        totp: TotpConfig,
    ) -> Self {
        Self::new(
            label,
            BlockKind::Navigation {
                url,
                navigation_goal: navigation_goal.into(),
                totp,
            },
        )
    }

    pub fn extraction(
        label: impl Into<String>,
        url: Option<BlockUrl>,
        data_extraction_goal: impl Into<String>,
        data_schema: Option<Value>,
    ) -> Self {
        Self::new(
            label,
            BlockKind::Extraction {
                url,
                data_extraction_goal: data_extraction_goal.into(),
                data_schema,
            },
        )
    }

    pub fn task(
        label: impl Into<String>,
        url: Option<BlockUrl>,
        navigation_goal: Option<String>,
        data_extraction_goal: Option<String>,
        data_schema: Option<Value>,
        totp: TotpConfig,
    ) -> Self {
        Self::new(
            label,
            BlockKind::Task {
                url,
                navigation_goal,
                data_extraction_goal,
                data_schema,
                totp,
            },
        )
    }

    pub fn for_loop(label: impl Into<String>, loop_over: impl Into<String>, inner: Block) -> Self {
        Self::new(
            label,
            BlockKind::ForLoop {
                loop_over: loop_over.into(),
                loop_block: Box::new(inner),
            },
        )
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self
    }

    pub fn url(&self) -> Option<&BlockUrl> {
        match &self.kind {
            BlockKind::GotoUrl { url } => Some(url),
            BlockKind::Navigation { url, .. }
            | BlockKind::Extraction { url, .. }
            | BlockKind::Task { url, .. } => url.as_ref(),
            BlockKind::ForLoop { .. } => None,
        }
    }

    /// Parameter the block writes its output into.
    pub fn output_parameter(&self) -> Parameter {
        Parameter::output(self.output_parameter.clone())
            .with_description(format!("Output of block `{}`", self.label))
    }

    /// Parameter keys this block (and its loop body) reads.
    pub fn referenced_parameters(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.parameters.iter().map(String::as_str).collect();
        if let Some(BlockUrl::Parameter(key)) = self.url() {
            keys.push(key);
        }
        if let BlockKind::ForLoop {
            loop_over,
            loop_block,
        } = &self.kind
        {
            keys.push(loop_over);
            keys.extend(loop_block.referenced_parameters());
        }
        keys
    }

    /// Output parameters of this block and any nested loop body.
    pub fn output_parameters(&self) -> Vec<Parameter> {
        let mut params = vec![self.output_parameter()];
        if let BlockKind::ForLoop { loop_block, .. } = &self.kind {
            params.extend(loop_block.output_parameters());
        }
        params
    }
}
