pub trait OpCode {
    fn op_code(&self) -> u8;
}

/// ROM commands, sent right after a reset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    SearchRom = 0xF0,
    MatchRom = 0x55,
    SkipRom = 0xCC,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}
