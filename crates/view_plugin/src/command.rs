use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::message::{FilterChoice, FilterOperation, ViewFilterDescriptor};

/// Bridge messages are `{"command": <name>, "args": <payload>}`.
pub const COMMAND_FIELD: &str = "command";
pub const ARGS_FIELD: &str = "args";

/// The complete command vocabulary a plugin may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum CommandName {
    SetRightPane,
    SetModalDialog,
    SetViewFilter,
    SetViewFilterChoices,
    SetViewFilterSelection,
    SetDocumentDetailLink,
    SetViewTitle,
}

/// The page a pane should load: either a bare URL string or `{"url": ...}`.
/// Relative URLs resolve against the plugin's own URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PaneSource {
    Url(String),
    Page { url: String },
}

impl PaneSource {
    pub fn url(&self) -> &str {
        match self {
            PaneSource::Url(url) | PaneSource::Page { url } => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FilterSelection {
    Ids(Vec<String>),
    Detailed {
        ids: Vec<String>,
        #[serde(default)]
        operation: FilterOperation,
    },
}

impl FilterSelection {
    pub fn ids(&self) -> &[String] {
        match self {
            FilterSelection::Ids(ids) | FilterSelection::Detailed { ids, .. } => ids,
        }
    }

    pub fn operation(&self) -> FilterOperation {
        match self {
            FilterSelection::Ids(_) => FilterOperation::Any,
            FilterSelection::Detailed { operation, .. } => *operation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LinkArgs {
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TitleArgs {
    Plain(String),
    Object { title: String },
}

impl TitleArgs {
    pub fn title(&self) -> &str {
        match self {
            TitleArgs::Plain(title) | TitleArgs::Object { title } => title,
        }
    }
}

/// A recognised bridge call with typed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "command", content = "args", rename_all = "camelCase")]
pub enum BridgeCommand {
    SetRightPane(Option<PaneSource>),
    SetModalDialog(Option<PaneSource>),
    SetViewFilter(ViewFilterDescriptor),
    SetViewFilterChoices(Vec<FilterChoice>),
    SetViewFilterSelection(FilterSelection),
    SetDocumentDetailLink(LinkArgs),
    SetViewTitle(TitleArgs),
}

impl BridgeCommand {
    pub fn name(&self) -> CommandName {
        match self {
            BridgeCommand::SetRightPane(_) => CommandName::SetRightPane,
            BridgeCommand::SetModalDialog(_) => CommandName::SetModalDialog,
            BridgeCommand::SetViewFilter(_) => CommandName::SetViewFilter,
            BridgeCommand::SetViewFilterChoices(_) => CommandName::SetViewFilterChoices,
            BridgeCommand::SetViewFilterSelection(_) => CommandName::SetViewFilterSelection,
            BridgeCommand::SetDocumentDetailLink(_) => CommandName::SetDocumentDetailLink,
            BridgeCommand::SetViewTitle(_) => CommandName::SetViewTitle,
        }
    }

    fn from_args(name: CommandName, args: Value) -> Result<Self, serde_json::Error> {
        Ok(match name {
            CommandName::SetRightPane => BridgeCommand::SetRightPane(serde_json::from_value(args)?),
            CommandName::SetModalDialog => BridgeCommand::SetModalDialog(serde_json::from_value(args)?),
            CommandName::SetViewFilter => BridgeCommand::SetViewFilter(serde_json::from_value(args)?),
            CommandName::SetViewFilterChoices => {
                BridgeCommand::SetViewFilterChoices(serde_json::from_value(args)?)
            }
            CommandName::SetViewFilterSelection => {
                BridgeCommand::SetViewFilterSelection(serde_json::from_value(args)?)
            }
            CommandName::SetDocumentDetailLink => {
                BridgeCommand::SetDocumentDetailLink(serde_json::from_value(args)?)
            }
            CommandName::SetViewTitle => BridgeCommand::SetViewTitle(serde_json::from_value(args)?),
        })
    }
}

/// How the router should treat one inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(BridgeCommand),
    /// Plugin-to-plugin data; forwarded without interpretation.
    Opaque(Value),
    /// Looked like a bridge call but is not one we can execute.
    Unknown { command: String, reason: String },
}

impl Inbound {
    /// Anything carrying a string `command` field is a bridge call attempt;
    /// every other JSON value is opaque.
    pub fn classify(payload: Value) -> Self {
        let Some(command) = payload.get(COMMAND_FIELD).and_then(Value::as_str) else {
            return Inbound::Opaque(payload);
        };
        let command = command.to_string();

        let name = match command.parse::<CommandName>() {
            Ok(name) => name,
            Err(_) => {
                return Inbound::Unknown { command, reason: "not in the bridge vocabulary".into() };
            }
        };

        let args = match payload {
            Value::Object(mut obj) => obj.remove(ARGS_FIELD).unwrap_or(Value::Null),
            _ => Value::Null,
        };
        match BridgeCommand::from_args(name, args) {
            Ok(cmd) => Inbound::Command(cmd),
            Err(err) => Inbound::Unknown { command, reason: format!("invalid args: {err}") },
        }
    }
}

/// Build the raw message for a bridge call, for plugin-side code and tests.
pub fn command_message(name: CommandName, args: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(COMMAND_FIELD.into(), Value::String(name.to_string()));
    obj.insert(ARGS_FIELD.into(), args);
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn command_names_are_camel_case() {
        assert_eq!(CommandName::SetRightPane.as_ref(), "setRightPane");
        assert_eq!(CommandName::SetViewFilterSelection.to_string(), "setViewFilterSelection");
        for name in CommandName::iter() {
            assert_eq!(name.to_string().parse::<CommandName>().unwrap(), name);
        }
    }

    #[test]
    fn classify_null_pane_is_close() {
        let msg = json!({"command": "setModalDialog", "args": null});
        assert_eq!(Inbound::classify(msg), Inbound::Command(BridgeCommand::SetModalDialog(None)));

        let missing_args = json!({"command": "setRightPane"});
        assert_eq!(
            Inbound::classify(missing_args),
            Inbound::Command(BridgeCommand::SetRightPane(None))
        );
    }

    #[test]
    fn classify_pane_source_forms() {
        let bare = Inbound::classify(json!({"command": "setRightPane", "args": "right-pane"}));
        let obj = Inbound::classify(json!({"command": "setRightPane", "args": {"url": "right-pane"}}));
        for inbound in [bare, obj] {
            match inbound {
                Inbound::Command(BridgeCommand::SetRightPane(Some(src))) => assert_eq!(src.url(), "right-pane"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn classify_selection_defaults_to_any() {
        let msg = json!({"command": "setViewFilterSelection", "args": ["foo", "bar"]});
        let Inbound::Command(BridgeCommand::SetViewFilterSelection(sel)) = Inbound::classify(msg) else {
            panic!("expected selection");
        };
        assert_eq!(sel.ids(), ["foo".to_string(), "bar".to_string()]);
        assert_eq!(sel.operation(), FilterOperation::Any);

        let msg = json!({"command": "setViewFilterSelection", "args": {"ids": ["foo"], "operation": "all"}});
        let Inbound::Command(BridgeCommand::SetViewFilterSelection(sel)) = Inbound::classify(msg) else {
            panic!("expected selection");
        };
        assert_eq!(sel.operation(), FilterOperation::All);
    }

    #[test]
    fn classify_opaque_and_unknown() {
        let opaque = json!({"This is": "a message"});
        assert_eq!(Inbound::classify(opaque.clone()), Inbound::Opaque(opaque));
        assert_eq!(Inbound::classify(json!([1, 2, 3])), Inbound::Opaque(json!([1, 2, 3])));
        // a non-string command field does not make a call
        assert_eq!(Inbound::classify(json!({"command": 7})), Inbound::Opaque(json!({"command": 7})));

        match Inbound::classify(json!({"command": "deleteEverything"})) {
            Inbound::Unknown { command, .. } => assert_eq!(command, "deleteEverything"),
            other => panic!("unexpected {other:?}"),
        }
        match Inbound::classify(json!({"command": "setViewTitle", "args": 42})) {
            Inbound::Unknown { reason, .. } => assert!(reason.starts_with("invalid args")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn serialized_command_classifies_back() {
        let cmd = BridgeCommand::SetDocumentDetailLink(LinkArgs { url: "http://p/foo".into(), text: "Text foo".into() });
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["command"], "setDocumentDetailLink");
        assert_eq!(Inbound::classify(value), Inbound::Command(cmd));
    }
}
