//! Addressable endpoints of the provisioning GATT service.
//!
//! | Endpoint        | Short UUID | Perms        |
//! |-----------------|------------|--------------|
//! | Service         | `0xFF00`   |              |
//! | List network    | `0xFF01`   | Write+Notify |
//! | Save network    | `0xFF02`   | Write+Notify |
//! | Edit network    | `0xFF03`   | Write+Notify |
//! | Delete network  | `0xFF04`   | Write+Notify |
//!
//! Each short id is spliced into bytes 12..14 of the vendor base UUID.

/// Vendor base UUID `3113a187-4b9f-4f9a-aa83-c614e11b0000`.
pub const BASE_UUID: u128 = 0x3113a187_4b9f_4f9a_aa83_c614e11b0000;

pub const SERVICE_SHORT_UUID: u16 = 0xFF00;
pub const SERVICE_UUID: u128 = uuid_from_short(SERVICE_SHORT_UUID);

/// Client characteristic configuration descriptor.
pub const CCCD_UUID: u16 = 0x2902;

/// Splice a 16-bit id into the base UUID.
pub const fn uuid_from_short(short: u16) -> u128 {
    (BASE_UUID & !(0xFFFF_u128 << 96)) | ((short as u128) << 96)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListNetwork,
    SaveNetwork,
    EditNetwork,
    DeleteNetwork,
}

impl Endpoint {
    pub const COUNT: usize = 4;

    pub const ALL: [Self; Self::COUNT] = [
        Self::ListNetwork,
        Self::SaveNetwork,
        Self::EditNetwork,
        Self::DeleteNetwork,
    ];

    pub const fn short_uuid(self) -> u16 {
        match self {
            Self::ListNetwork => 0xFF01,
            Self::SaveNetwork => 0xFF02,
            Self::EditNetwork => 0xFF03,
            Self::DeleteNetwork => 0xFF04,
        }
    }

    pub const fn uuid(self) -> u128 {
        uuid_from_short(self.short_uuid())
    }

    /// Dense slot for per-endpoint tables.
    pub const fn slot(self) -> usize {
        match self {
            Self::ListNetwork => 0,
            Self::SaveNetwork => 1,
            Self::EditNetwork => 2,
            Self::DeleteNetwork => 3,
        }
    }

    pub fn from_short_uuid(short: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.short_uuid() == short)
    }

    pub fn from_uuid(uuid: u128) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.uuid() == uuid)
    }
}
