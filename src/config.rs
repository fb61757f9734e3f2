//! Library-caller-facing knobs, consolidated from the teacher's loose
//! `speed`/`ticks_between_updates`/`skip_os_emulation` fields on `Emulator`
//! (`src/emulator.rs`) into one struct.

/// Settings a caller can tune when constructing a [`crate::cpu::Cpu`].
#[derive(Debug, Clone, Copy)]
pub struct EmulatorConfig {
    /// Upper bound on the number of instructions [`crate::cpu::Cpu::run`]
    /// will execute before stopping, even if the program never halts.
    /// `None` means run until halted or faulted.
    pub max_steps: Option<usize>,
    /// Whether `LEA` updates the condition codes. The spec follows the 3rd
    /// edition textbook (`false`); some course materials use an earlier
    /// edition where it does.
    pub lea_sets_condition_codes: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            lea_sets_condition_codes: false,
        }
    }
}
