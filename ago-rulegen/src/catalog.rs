use serde::Serialize;

/// Static description of one block kind for the rule editor palette. The
/// catalog never changes after startup; behavior lives in the Lua emitter.
#[derive(Clone, Debug, Serialize)]
pub struct BlockDefinition {
    pub id: &'static str,
    pub title: &'static str,
    pub category: &'static str,
    pub colour: &'static str,
    pub tooltip: &'static str,
    pub fields: Vec<BlockField>,
    pub value_inputs: Vec<BlockInput>,
    pub statement_inputs: Vec<&'static str>,
    pub has_output: bool,
    pub accepts_next: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct BlockField {
    pub key: &'static str,
    pub label: &'static str,
    pub default_value: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct BlockInput {
    pub key: &'static str,
    pub label: &'static str,
    pub placeholder: &'static str,
}

const COLOUR_VALUE: &str = "#5b80a5";
const COLOUR_LOGIC: &str = "#5ba55b";
const COLOUR_MATH: &str = "#a55b5b";
const COLOUR_TEXT: &str = "#a5895b";
const COLOUR_TIME: &str = "#8a5ba5";
const COLOUR_ACTION: &str = "#a55b80";

fn field(key: &'static str, label: &'static str, default_value: &'static str) -> BlockField {
    BlockField {
        key,
        label,
        default_value,
    }
}

fn input(key: &'static str, label: &'static str, placeholder: &'static str) -> BlockInput {
    BlockInput {
        key,
        label,
        placeholder,
    }
}

pub fn block_catalog() -> Vec<BlockDefinition> {
    vec![
        BlockDefinition {
            id: "number_literal",
            title: "Number",
            category: "value",
            colour: COLOUR_VALUE,
            tooltip: "A number constant.",
            fields: vec![field("value", "Value", "0")],
            value_inputs: vec![],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "text_literal",
            title: "Text",
            category: "value",
            colour: COLOUR_VALUE,
            tooltip: "A text constant.",
            fields: vec![field("value", "Value", "")],
            value_inputs: vec![],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "boolean_literal",
            title: "Boolean",
            category: "value",
            colour: COLOUR_VALUE,
            tooltip: "True or false.",
            fields: vec![field("value", "Value", "true")],
            value_inputs: vec![],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "variable_get",
            title: "Get Variable",
            category: "value",
            colour: COLOUR_VALUE,
            tooltip: "Read a variable. Names starting with ago_ read from the script context.",
            fields: vec![field("name", "Variable", "value")],
            value_inputs: vec![],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "event_field",
            title: "Event Field",
            category: "value",
            colour: COLOUR_VALUE,
            tooltip: "Read a field of the event that triggered this rule.",
            fields: vec![field("field", "Field", "level")],
            value_inputs: vec![],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "device_state",
            title: "Device State",
            category: "value",
            colour: COLOUR_VALUE,
            tooltip: "Read the current state of a device.",
            fields: vec![field("device", "Device", "")],
            value_inputs: vec![],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "compare",
            title: "Compare",
            category: "logic",
            colour: COLOUR_LOGIC,
            tooltip: "Compare two values.",
            fields: vec![field("op", "Operator", "eq")],
            value_inputs: vec![input("A", "Left", "value"), input("B", "Right", "value")],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "logic",
            title: "And / Or",
            category: "logic",
            colour: COLOUR_LOGIC,
            tooltip: "Combine two conditions.",
            fields: vec![field("op", "Operator", "and")],
            value_inputs: vec![
                input("A", "Left", "condition"),
                input("B", "Right", "condition"),
            ],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "negate",
            title: "Not",
            category: "logic",
            colour: COLOUR_LOGIC,
            tooltip: "Invert a condition.",
            fields: vec![],
            value_inputs: vec![input("BOOL", "Condition", "condition")],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "math",
            title: "Arithmetic",
            category: "math",
            colour: COLOUR_MATH,
            tooltip: "Arithmetic on two numbers.",
            fields: vec![field("op", "Operator", "add")],
            value_inputs: vec![input("A", "Left", "0"), input("B", "Right", "0")],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "text_join",
            title: "Join Text",
            category: "text",
            colour: COLOUR_TEXT,
            tooltip: "Concatenate two pieces of text.",
            fields: vec![],
            value_inputs: vec![input("A", "Left", "text"), input("B", "Right", "text")],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "datetime_totimestamp",
            title: "Datetime To Timestamp",
            category: "time",
            colour: COLOUR_TIME,
            tooltip: "Parse a datetime string into a unix timestamp.",
            fields: vec![],
            value_inputs: vec![
                input("VALUE", "Datetime", "21/06/2026 08:30"),
                input("PATTERN", "Pattern", "(%d+)/(%d+)/(%d+) (%d+):(%d+)"),
            ],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "timestamp_now",
            title: "Now",
            category: "time",
            colour: COLOUR_TIME,
            tooltip: "The current unix timestamp.",
            fields: vec![],
            value_inputs: vec![],
            statement_inputs: vec![],
            has_output: true,
            accepts_next: false,
        },
        BlockDefinition {
            id: "variable_set",
            title: "Set Variable",
            category: "action",
            colour: COLOUR_ACTION,
            tooltip: "Assign a variable. Names starting with ago_ write to the script context.",
            fields: vec![field("name", "Variable", "value")],
            value_inputs: vec![input("VALUE", "Value", "value")],
            statement_inputs: vec![],
            has_output: false,
            accepts_next: true,
        },
        BlockDefinition {
            id: "send_command",
            title: "Send Command",
            category: "action",
            colour: COLOUR_ACTION,
            tooltip: "Send a command to a device, with optional parameters.",
            fields: vec![field("device", "Device", ""), field("command", "Command", "on")],
            value_inputs: vec![],
            statement_inputs: vec![],
            has_output: false,
            accepts_next: true,
        },
        BlockDefinition {
            id: "if_else",
            title: "If / Else",
            category: "action",
            colour: COLOUR_LOGIC,
            tooltip: "Run statements when a condition holds.",
            fields: vec![],
            value_inputs: vec![input("IF", "Condition", "condition")],
            statement_inputs: vec!["THEN", "ELSE"],
            has_output: false,
            accepts_next: true,
        },
        BlockDefinition {
            id: "trigger_guard",
            title: "When Event",
            category: "action",
            colour: COLOUR_ACTION,
            tooltip: "Run the rule only for a matching device event.",
            fields: vec![
                field("device", "Device", ""),
                field("subject", "Event", "event.device.statechanged"),
            ],
            value_inputs: vec![],
            statement_inputs: vec!["DO"],
            has_output: false,
            accepts_next: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_ids_are_unique() {
        let catalog = block_catalog();
        let ids = catalog
            .iter()
            .map(|definition| definition.id)
            .collect::<HashSet<_>>();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn value_blocks_declare_an_output_and_statements_do_not() {
        for definition in block_catalog() {
            if definition.has_output {
                assert!(
                    !definition.accepts_next,
                    "value block '{}' must not chain",
                    definition.id
                );
                assert!(
                    definition.statement_inputs.is_empty(),
                    "value block '{}' must not hold statements",
                    definition.id
                );
            }
        }
    }
}
