//! Gateway intents
//!
//! The bitmask forwarded verbatim in the identify payload; it tells the
//! server which event groups this connection wants.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags::bitflags! {
    /// Event groups a connection subscribes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u64 {
        const GUILDS = 1 << 0;
        const GUILD_MEMBERS = 1 << 1;
        const GUILD_MESSAGES = 1 << 2;
        const GUILD_MESSAGE_REACTIONS = 1 << 3;
        const GUILD_PRESENCES = 1 << 4;
        const DIRECT_MESSAGES = 1 << 5;
        const TYPING = 1 << 6;
        const MESSAGE_CONTENT = 1 << 7;
    }
}

impl Intents {
    /// Everything that does not require server-side approval.
    #[must_use]
    pub fn unprivileged() -> Self {
        Self::all() & !Self::GUILD_MEMBERS & !Self::GUILD_PRESENCES & !Self::MESSAGE_CONTENT
    }
}

impl Default for Intents {
    fn default() -> Self {
        Self::empty()
    }
}

impl Serialize for Intents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u64::deserialize(deserializer)?;
        Ok(Self::from_bits_retain(bits))
    }
}
