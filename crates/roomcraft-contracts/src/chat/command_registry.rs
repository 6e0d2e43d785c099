#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub arg_key: &'static str,
}

/// Commands whose remainder is taken verbatim (after trimming).
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "style",
        action: "select_style",
        arg_key: "style",
    },
    CommandSpec {
        command: "edit",
        action: "edit_image",
        arg_key: "instruction",
    },
];

/// Commands taking one filesystem path, shell-quoted if it has spaces.
pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload_image",
        arg_key: "path",
    },
    CommandSpec {
        command: "save",
        action: "save_images",
        arg_key: "path",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "styles",
        action: "list_styles",
        arg_key: "",
    },
    CommandSpec {
        command: "dismiss",
        action: "dismiss_error",
        arg_key: "",
    },
    CommandSpec {
        command: "status",
        action: "show_status",
        arg_key: "",
    },
    CommandSpec {
        command: "help",
        action: "help",
        arg_key: "",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
        arg_key: "",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
        arg_key: "",
    },
];

pub const REPL_HELP_COMMANDS: &[(&str, &str)] = &[
    ("/upload <path>", "load a room photo (resets styles and chat)"),
    ("/styles", "list available design styles"),
    ("/style <name>", "restyle the room, reusing an earlier result if any"),
    ("/edit <instruction>", "edit the image shown for the active style"),
    ("/save <dir>", "write the original and current variant to a folder"),
    ("/status", "show the current studio state"),
    ("/dismiss", "clear the current error"),
    ("/help", "show this list"),
    ("/quit", "leave the studio"),
];
