use std::ops::RangeInclusive;

/// TCP port the controller listens on.
pub const DEFAULT_PORT: u16 = 49_999;

// ---- CAN addresses ----
pub const SCB_ADDRESS: u8 = 0x3D;
pub const SSU_ADDRESS: u8 = 0x00;
/// 28 peripheral slots.
pub const PMB_ADDRESSES: RangeInclusive<u8> = 0x01..=0x1C;

pub fn is_known_address(addr: u8) -> bool {
    addr == SCB_ADDRESS || addr == SSU_ADDRESS || PMB_ADDRESSES.contains(&addr)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    GetDevData = 0x00,
    /// Generic telemetry read; the only command the attacks and the liveness probe use.
    GetScbData = 0x01,
    GetStringData = 0x02,
    DcdcPassthrough = 0x19,
}

impl CommandId {
    pub fn id(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandId {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x00 => Ok(CommandId::GetDevData),
            0x01 => Ok(CommandId::GetScbData),
            0x02 => Ok(CommandId::GetStringData),
            0x19 => Ok(CommandId::DcdcPassthrough),
            other => Err(other),
        }
    }
}

/// The harmless telemetry read used for liveness checks and as flood traffic.
pub fn probe_frame() -> Vec<u8> {
    crate::frame::build_frame(SCB_ADDRESS, CommandId::GetScbData.id(), &[])
}
