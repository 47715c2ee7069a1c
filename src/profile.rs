//! Device CLI dialects and prompt classification.
//!
//! A [`DeviceKind`] names the CLI family of a device. Each kind maps to a static [`Dialect`]
//! describing the two workflow commands and the patterns needed to drive an interactive shell:
//! prompts, paging markers, error lines and confirmation questions.
//!
//! [`PromptMatcher`] compiles those patterns into one [`RegexSet`] and classifies each line of
//! shell output into a [`LineKind`].

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use log::trace;
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ConnectError, DispatchError};

/// Built-in device dialects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// HP/Aruba ProCurve switches.
    #[default]
    HpProcurve,
    /// Cisco IOS and IOS-XE.
    CiscoIos,
    /// Huawei VRP.
    Huawei,
    /// H3C Comware.
    H3c,
    /// Hillstone StoneOS.
    Hillstone,
}

/// All built-in dialects, in catalog order.
pub const BUILTIN_PROFILES: &[DeviceKind] = &[
    DeviceKind::HpProcurve,
    DeviceKind::CiscoIos,
    DeviceKind::Huawei,
    DeviceKind::H3c,
    DeviceKind::Hillstone,
];

/// Static description of a device CLI family.
#[derive(Debug)]
pub struct Dialect {
    pub name: &'static str,
    /// Persists the running configuration to non-volatile storage.
    pub save_command: &'static str,
    /// Default status/inventory command.
    pub status_command: &'static str,
    pub prompts: &'static [&'static str],
    /// Paging markers, answered with a space.
    pub more: &'static [&'static str],
    /// Lines meaning the device rejected the last command.
    pub errors: &'static [&'static str],
    /// Interactive questions and the answer to send.
    pub inputs: &'static [(&'static str, &'static str)],
}

static HP_PROCURVE: Dialect = Dialect {
    name: "hp_procurve",
    save_command: "write memory",
    status_command: "show flash",
    prompts: &[r"^[\w.\-/:]+(\([\w.\-]+\))?[#>]\s*$"],
    more: &[r"-- MORE --.*", r"\s*--More--\s*"],
    errors: &[
        r"^Invalid input: .*",
        r"^Ambiguous input: .*",
        r"^Incomplete input: .*",
        r"^Error: .+",
    ],
    inputs: &[
        (r"Press any key to continue", "\n"),
        (r"(?i)Do you want to save current configuration \[y/n\]", "y"),
    ],
};

static CISCO_IOS: Dialect = Dialect {
    name: "cisco_ios",
    save_command: "write memory",
    status_command: "show flash:",
    prompts: &[r"^[\w.\-/:]+(\([\w.\-]+\))?[#>]\s*$"],
    more: &[r"\s*--More--\s*", r"\s*<--- More --->\s*"],
    errors: &[
        r"^% Invalid input detected.*",
        r"^% Incomplete command.*",
        r"^% Ambiguous command.*",
        r"^Command authorization failed.*",
        r"^Command rejected:.*",
        r"^ERROR:.+",
    ],
    inputs: &[
        (r"Destination filename \[\S+\]\?\s*$", "\n"),
        (r"\[confirm\]\s*$", "\n"),
    ],
};

static HUAWEI: Dialect = Dialect {
    name: "huawei",
    save_command: "save",
    status_command: "dir flash:",
    prompts: &[
        r"^(HRP_M|HRP_S){0,1}\[.+]+\s*$",
        r"^(RBM_P|RBM_S)?<.+>\s*$",
    ],
    more: &[r"\s*---- More ----\s*"],
    errors: &[r"^Error: .+$", r"^\s*\^$"],
    inputs: &[
        (r"Are you sure to continue\?\s*\[Y/N\]:?\s*", "y"),
        (
            r"startup saved-configuration file on peer device\?\[Y/N\]:?\s*",
            "y",
        ),
    ],
};

static H3C: Dialect = Dialect {
    name: "h3c",
    save_command: "save force",
    status_command: "dir flash:",
    prompts: &[r"^(RBM_P|RBM_S)?\[.+\]\s*$", r"^(RBM_P|RBM_S)?<.+>\s*$"],
    more: &[r"\s*---- More ----\s*"],
    errors: &[r"^\s*% (Unrecognized|Incomplete|Too many|Wrong).*", r"^\s*\^$"],
    inputs: &[],
};

static HILLSTONE: Dialect = Dialect {
    name: "hillstone",
    save_command: "save",
    status_command: "show version",
    prompts: &[r"^.+\(config.*\)\s*#\s*$", r"^[^\s#]+#\s*$"],
    more: &[r"\s*--More--\s*"],
    errors: &[r"^Error: .+", r"^错误.+", r"^\s*\^-+.*"],
    inputs: &[
        (r"Save configuration, are you sure\? \[y\]/n:\s*", "y"),
        (
            r"Save configuration for all VSYS, are you sure\? \[y\]/n:\s*",
            "y",
        ),
        (
            r"Backup start configuration file, are you sure\? y/\[n\]:\s*",
            "n",
        ),
    ],
};

impl DeviceKind {
    /// Static dialect description for this kind.
    pub fn dialect(&self) -> &'static Dialect {
        match self {
            DeviceKind::HpProcurve => &HP_PROCURVE,
            DeviceKind::CiscoIos => &CISCO_IOS,
            DeviceKind::Huawei => &HUAWEI,
            DeviceKind::H3c => &H3C,
            DeviceKind::Hillstone => &HILLSTONE,
        }
    }

    pub fn name(&self) -> &'static str {
        self.dialect().name
    }

    pub fn save_command(&self) -> &'static str {
        self.dialect().save_command
    }

    pub fn status_command(&self) -> &'static str {
        self.dialect().status_command
    }

    /// Compiles the prompt matcher for this dialect.
    pub fn matcher(&self) -> Result<PromptMatcher, ConnectError> {
        PromptMatcher::for_dialect(self.dialect())
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceKind {
    type Err = DispatchError;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        BUILTIN_PROFILES
            .iter()
            .copied()
            .find(|kind| kind.name() == key)
            .ok_or_else(|| DispatchError::UnknownProfile(s.to_string()))
    }
}

/// Leading carriage returns and backspace runs emitted by terminal redraws.
pub static IGNORE_START_LINE: Lazy<Regex> =
    Lazy::new(
        || match Regex::new(r"^(\r+(\s+\r+)*)|(\u{8}+(\s+\u{8}+)*)") {
            Ok(re) => re,
            Err(err) => panic!("invalid IGNORE_START_LINE regex: {err}"),
        },
    );

/// VT100 control sequences, which ProCurve firmware sprinkles everywhere.
pub static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(
        || match Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]|\x1b[=>EM78]") {
            Ok(re) => re,
            Err(err) => panic!("invalid ANSI_ESCAPE regex: {err}"),
        },
    );

/// Removes terminal control noise from a chunk of shell output.
pub fn clean_output(raw: &str) -> Cow<'_, str> {
    match ANSI_ESCAPE.replace_all(raw, "") {
        Cow::Borrowed(s) => IGNORE_START_LINE.replace(s, ""),
        Cow::Owned(s) => Cow::Owned(IGNORE_START_LINE.replace(&s, "").into_owned()),
    }
}

/// Classification of one line of shell output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Plain command output.
    Output,
    /// The device is ready for the next command.
    Prompt,
    /// Paging marker; a space continues the listing.
    More,
    /// The device rejected the last command.
    Error,
    /// The device asked a question; the payload is the answer to send.
    Input(String),
}

/// Classifies shell lines against a dialect's patterns.
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    all_regex: RegexSet,
    /// Maps regex match index to its line kind.
    kinds: Vec<LineKind>,
}

impl PromptMatcher {
    /// Builds a matcher. Earlier groups win when a line matches several patterns:
    /// paging, then errors, then questions, then prompts.
    pub fn new(
        prompts: &[&str],
        more: &[&str],
        errors: &[&str],
        inputs: &[(&str, &str)],
    ) -> Result<Self, ConnectError> {
        let mut regexs: Vec<String> = Vec::new();
        let mut kinds = Vec::new();

        for pattern in more {
            regexs.push(pattern.to_string());
            kinds.push(LineKind::More);
        }
        for pattern in errors {
            regexs.push(pattern.to_string());
            kinds.push(LineKind::Error);
        }
        for (pattern, answer) in inputs {
            regexs.push(pattern.to_string());
            kinds.push(LineKind::Input(answer.to_string()));
        }
        // Prompt patterns get the common prefix; any leading '^' is stripped to avoid duplication.
        for pattern in prompts {
            regexs.push(format!(r"^\x00*\r{{0,1}}{}", pattern.trim_start_matches('^')));
            kinds.push(LineKind::Prompt);
        }

        let all_regex = RegexSet::new(&regexs).map_err(|err| {
            ConnectError::InvalidPromptConfig(format!("failed to build prompt regex set: {err}"))
        })?;

        Ok(Self { all_regex, kinds })
    }

    pub fn for_dialect(dialect: &Dialect) -> Result<Self, ConnectError> {
        Self::new(
            dialect.prompts,
            dialect.more,
            dialect.errors,
            dialect.inputs,
        )
    }

    /// Classifies a single line (without its trailing newline).
    pub fn classify(&self, line: &str) -> LineKind {
        let kind = self
            .all_regex
            .matches(line)
            .iter()
            .next()
            .and_then(|index| self.kinds.get(index))
            .cloned()
            .unwrap_or(LineKind::Output);
        trace!("Line {:?} classified as {:?}", line, kind);
        kind
    }
}
