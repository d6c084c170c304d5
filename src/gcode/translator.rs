//! Command-translation engine.
//!
//! Rewrites each queued Marlin-dialect command into the commands actually
//! sent to the printer. Evaluation is an explicit, ordered, first-match-
//! wins rule table over the opcode, after a guard that restricts traffic
//! while a print runs from on-device storage. Pure with respect to its
//! inputs except for the single documented side effect on
//! `relative_positioning_emulated`; it never fails, anomalies resolve to
//! "forward unchanged" or "drop".

use super::{Command, Opcode, normalize_case};
use crate::config::ConfigFlags;
use crate::state::ConnectionState;

/// Opcodes still allowed through while printing from on-device storage:
/// pause/resume/cancel, position and temperature reports, emergency stop,
/// messages and the wait-for-moves keep-alive. Everything else risks
/// destabilizing the running print and is dropped. Allow-listed commands
/// continue through the rule table (the cancel alias below must stay
/// reachable mid-print).
pub const STORAGE_PRINT_ALLOWLIST: &[&str] = &[
    "M24", "M25", "M26", "M27", "M104", "M105", "M112", "M114", "M117", "M400",
];

/// Inputs a rule may read besides the command itself.
///
/// `cancelling` is a transient signal owned by the surrounding session;
/// the translator reads it to disambiguate the M26 cancel alias but never
/// writes it.
pub struct RuleContext<'a> {
    pub flags: &'a ConfigFlags,
    pub cancelling: bool,
}

struct Rule {
    name: &'static str,
    matches: fn(Opcode, &Command, &ConnectionState, &RuleContext<'_>) -> bool,
    apply: fn(&Command, &mut ConnectionState, &RuleContext<'_>) -> Vec<Command>,
}

/// The translation rule table. Order matters: several opcodes could match
/// more than one concern, and the first matching rule wins.
const RULES: &[Rule] = &[
    Rule {
        name: "home-axes",
        matches: |op, _, _, _| op.letter == 'G' && op.number == 28,
        apply: home_axes,
    },
    Rule {
        name: "relative-positioning",
        matches: |op, _, _, _| op.letter == 'G' && op.number == 91,
        apply: relative_positioning,
    },
    Rule {
        // M20 list storage / M21 init storage hang the device mid-operation
        name: "storage-listing-while-busy",
        matches: |op, _, state, _| {
            op.letter == 'M' && (op.number == 20 || op.number == 21) && !state.is_ready
        },
        apply: |_, _, _| Vec::new(),
    },
    Rule {
        // Marlin M26 = set storage position; this device's M26 = cancel
        name: "cancel-alias",
        matches: |op, _, _, _| op.letter == 'M' && op.number == 26,
        apply: cancel_alias,
    },
    Rule {
        // extruder absolute/relative positioning, no device equivalent
        name: "extruder-positioning",
        matches: |op, _, _, _| op.letter == 'M' && (op.number == 82 || op.number == 83),
        apply: |_, _, _| Vec::new(),
    },
    Rule {
        name: "disable-steppers",
        matches: |op, _, _, _| op.letter == 'M' && op.number == 84,
        apply: |cmd, _, _| vec![cmd.rewritten("M18")],
    },
    Rule {
        name: "fan-off",
        matches: |op, cmd, _, _| op.letter == 'M' && op.number == 106 && cmd.line().contains("S0"),
        apply: |cmd, _, _| vec![cmd.rewritten("M107")],
    },
    Rule {
        // bare M108 is Marlin's heater-wait abort; with a tool argument it
        // is this device's tool change and falls through unchanged
        name: "heater-wait-abort",
        matches: |_, cmd, _, _| cmd.line() == "M108",
        apply: |_, _, _| Vec::new(),
    },
    Rule {
        name: "wait-extruder-temperature",
        matches: |op, _, _, _| op.letter == 'M' && op.number == 109,
        apply: |cmd, _, _| vec![cmd.rewritten(cmd.line().replacen("M109", "M6", 1))],
    },
    Rule {
        // handshake happens once at connection time, never per command
        name: "hello",
        matches: |op, _, _, _| op.letter == 'M' && op.number == 110,
        apply: |_, _, _| Vec::new(),
    },
    Rule {
        // status is derived from the keep-alive probe
        name: "status-query",
        matches: |op, _, _, _| op.letter == 'M' && op.number == 119,
        apply: |_, _, _| Vec::new(),
    },
    Rule {
        // changing LED color mid-print hangs some firmwares
        name: "led-color-while-printing",
        matches: |op, _, state, _| op.letter == 'M' && op.number == 146 && state.is_printing,
        apply: |_, _, _| Vec::new(),
    },
    Rule {
        name: "wait-bed-temperature",
        matches: |op, _, _, _| op.letter == 'M' && op.number == 190,
        apply: |cmd, _, _| vec![cmd.rewritten(cmd.line().replacen("M190", "M7", 1))],
    },
    Rule {
        name: "tool-select",
        matches: |op, _, _, _| op.letter == 'T',
        apply: |cmd, _, _| vec![cmd.rewritten(format!("M108 {}", cmd.line()))],
    },
];

/// Translate one queued command into the zero or more commands to send.
pub fn translate(
    cmd: &Command,
    state: &mut ConnectionState,
    flags: &ConfigFlags,
    cancelling: bool,
) -> Vec<Command> {
    let cmd = normalize_case(cmd, &flags.case_sensitive_opcodes);

    let Some(opcode) = cmd.opcode() else {
        // most likely part of the header in a sliced print file
        tracing::debug!("unrecognized command, dropping: {:?}", cmd.line());
        return Vec::new();
    };

    if state.is_printing_from_storage && !is_allowlisted(opcode) {
        tracing::debug!("printing from storage, dropping {}", cmd.line());
        return Vec::new();
    }

    let ctx = RuleContext { flags, cancelling };
    for rule in RULES {
        if (rule.matches)(opcode, &cmd, state, &ctx) {
            let out = (rule.apply)(&cmd, state, &ctx);
            if out.is_empty() {
                tracing::debug!("rule {} dropped {}", rule.name, cmd.line());
            } else {
                tracing::debug!("rule {} rewrote {}", rule.name, cmd.line());
            }
            return out;
        }
    }

    // no rule claimed it, forward unchanged
    vec![cmd]
}

fn is_allowlisted(op: Opcode) -> bool {
    let name = op.to_string();
    STORAGE_PRINT_ALLOWLIST.contains(&name.as_str())
}

fn home_axes(cmd: &Command, _state: &mut ConnectionState, ctx: &RuleContext<'_>) -> Vec<Command> {
    // Strip digits from the axis list ("G28 X0 Y0" homes X and Y).
    let axes: String = cmd
        .args()
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .collect();
    let axes = axes.split_whitespace().collect::<Vec<_>>().join(" ");
    let line = if axes.is_empty() {
        "G28".to_string()
    } else {
        format!("G28 {}", axes)
    };

    // Without native relative positioning the device cannot home X and Y
    // in one call; the first home must finish or the second axis is
    // ignored. Split into two sequential single-axis homes.
    if ctx.flags.disable_g91 && line == "G28 X Y" {
        vec![cmd.rewritten("G28 X"), Command::new("G28 Y")]
    } else {
        vec![cmd.rewritten(line)]
    }
}

fn relative_positioning(
    cmd: &Command,
    state: &mut ConnectionState,
    ctx: &RuleContext<'_>,
) -> Vec<Command> {
    if ctx.flags.disable_g91 {
        // Emulate relative moves in absolute mode: remember we are
        // emulating and request a position report to seed the deltas.
        state.relative_positioning_emulated = true;
        vec![cmd.clone(), Command::new("M114")]
    } else {
        state.relative_positioning_emulated = false;
        vec![cmd.clone()]
    }
}

fn cancel_alias(cmd: &Command, _state: &mut ConnectionState, ctx: &RuleContext<'_>) -> Vec<Command> {
    // The host emits "M26 S0" while cancelling a storage print; that is
    // the only form forwarded, as the device's cancel command.
    if cmd.line() == "M26 S0" && ctx.cancelling {
        vec![cmd.rewritten("M26")]
    } else {
        Vec::new()
    }
}
