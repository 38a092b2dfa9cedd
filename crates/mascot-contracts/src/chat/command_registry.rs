#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "variations",
        action: "generate_variations",
    },
    CommandSpec {
        command: "build",
        action: "build",
    },
    CommandSpec {
        command: "undo",
        action: "undo",
    },
    CommandSpec {
        command: "redo",
        action: "redo",
    },
    CommandSpec {
        command: "sections",
        action: "show_sections",
    },
    CommandSpec {
        command: "new",
        action: "new_project",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "reference",
        action: "set_reference",
    },
    CommandSpec {
        command: "save",
        action: "save_project",
    },
    CommandSpec {
        command: "open",
        action: "open_project",
    },
    CommandSpec {
        command: "export",
        action: "export_images",
    },
];

/// `/<command> <section_id> <text>` edits one text field of a section.
pub(crate) const TEXT_FIELD_COMMANDS: &[(CommandSpec, &str)] = &[
    (
        CommandSpec {
            command: "heading",
            action: "set_field",
        },
        "heading",
    ),
    (
        CommandSpec {
            command: "paragraph",
            action: "set_field",
        },
        "paragraph",
    ),
    (
        CommandSpec {
            command: "nav",
            action: "set_field",
        },
        "nav_title",
    ),
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/variations",
    "/select",
    "/build",
    "/reference",
    "/heading",
    "/paragraph",
    "/nav",
    "/items",
    "/social",
    "/font_size",
    "/move",
    "/undo",
    "/redo",
    "/sections",
    "/edit",
    "/adjust",
    "/save",
    "/open",
    "/export",
    "/new",
    "/help",
];
