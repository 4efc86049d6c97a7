//! Supported commands
//!
//! [`Command`] is the closed set of command words the processor acts on.
//! Decoding goes through a [`CommandTrie`] built once per process.

use super::dispatcher::CommandTrie;
use std::sync::OnceLock;

/// Decoded command word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `G0` / `G1`, and `VG1` from a comment
    LinearMove,
    /// `G2` (clockwise) / `G3`
    ArcMove { clockwise: bool },
    /// `G4`
    Dwell,
    /// `G10` / `G22`
    Retract,
    /// `G11` / `G23`
    Unretract,
    /// `G20`
    InchUnits,
    /// `G21`
    MillimeterUnits,
    /// `G28`
    Home,
    /// `G29`
    BedLeveling,
    /// `G90`
    AbsolutePositioning,
    /// `G91`
    RelativePositioning,
    /// `G92`
    SetPosition,
    /// `M1`
    Sleep,
    /// `M82`
    AbsoluteExtrusion,
    /// `M83`
    RelativeExtrusion,
    /// `M104`, and `VM104` from a comment
    SetNozzleTemperature,
    /// `M106`
    FanOn,
    /// `M107`
    FanOff,
    /// `M108` / `M135`
    SelectTool,
    /// `M109`, and `VM109` from a comment
    WaitNozzleTemperature,
    /// `M132`
    ResetAxes,
    /// `M140` / `M190`
    SetBedTemperature,
    /// `M191`
    WaitChamberTemperature,
    /// `M201`
    MaxAcceleration,
    /// `M203`
    MaxFeedrate,
    /// `M204`
    Acceleration,
    /// `M205`
    AdvancedSettings,
    /// `M221`
    ExtrudeFactor,
    /// `M400`
    WaitMoves,
    /// `M401`
    SavePosition,
    /// `M402`
    RestorePosition,
    /// `M566`
    JerkPerMinute,
    /// `M702`
    UnloadFilament,
    /// `M1020`
    FilamentChange,
    /// `SYNC`
    Sync,
    /// `T<n>`
    ToolChange,
    /// `VT<n>` from a comment
    VirtualToolChange,
}

const MNEMONICS: &[(&str, Command, bool)] = &[
    ("G0", Command::LinearMove, false),
    ("G1", Command::LinearMove, false),
    ("G2", Command::ArcMove { clockwise: true }, false),
    ("G3", Command::ArcMove { clockwise: false }, false),
    ("G4", Command::Dwell, false),
    ("G10", Command::Retract, false),
    ("G11", Command::Unretract, false),
    ("G20", Command::InchUnits, false),
    ("G21", Command::MillimeterUnits, false),
    ("G22", Command::Retract, false),
    ("G23", Command::Unretract, false),
    ("G28", Command::Home, false),
    ("G29", Command::BedLeveling, false),
    ("G90", Command::AbsolutePositioning, false),
    ("G91", Command::RelativePositioning, false),
    ("G92", Command::SetPosition, false),
    ("M1", Command::Sleep, false),
    ("M82", Command::AbsoluteExtrusion, false),
    ("M83", Command::RelativeExtrusion, false),
    ("M104", Command::SetNozzleTemperature, false),
    ("M106", Command::FanOn, false),
    ("M107", Command::FanOff, false),
    ("M108", Command::SelectTool, false),
    ("M109", Command::WaitNozzleTemperature, false),
    ("M132", Command::ResetAxes, false),
    ("M135", Command::SelectTool, false),
    ("M140", Command::SetBedTemperature, false),
    ("M190", Command::SetBedTemperature, false),
    ("M191", Command::WaitChamberTemperature, false),
    ("M201", Command::MaxAcceleration, false),
    ("M203", Command::MaxFeedrate, false),
    ("M204", Command::Acceleration, false),
    ("M205", Command::AdvancedSettings, false),
    ("M221", Command::ExtrudeFactor, false),
    ("M400", Command::WaitMoves, false),
    ("M401", Command::SavePosition, false),
    ("M402", Command::RestorePosition, false),
    ("M566", Command::JerkPerMinute, false),
    ("M702", Command::UnloadFilament, false),
    ("M1020", Command::FilamentChange, false),
    ("SYNC", Command::Sync, false),
    ("T", Command::ToolChange, true),
    ("VG1", Command::LinearMove, false),
    ("VM104", Command::SetNozzleTemperature, false),
    ("VM109", Command::WaitNozzleTemperature, false),
    ("VT", Command::VirtualToolChange, true),
];

fn build_trie() -> CommandTrie<Command> {
    let mut trie = CommandTrie::new();
    for (mnemonic, command, early_quit) in MNEMONICS {
        trie.register(mnemonic, *command, *early_quit)
            .expect("command table has no duplicates");
        trie.register(&mnemonic.to_ascii_lowercase(), *command, *early_quit)
            .expect("command table has no duplicates");
    }
    trie
}

fn command_trie() -> &'static CommandTrie<Command> {
    static TRIE: OnceLock<CommandTrie<Command>> = OnceLock::new();
    TRIE.get_or_init(build_trie)
}

impl Command {
    /// Decode a command word; `None` for anything the processor ignores
    pub fn decode(word: &str) -> Option<Command> {
        if word.is_empty() {
            return None;
        }
        command_trie().lookup(word)
    }
}
