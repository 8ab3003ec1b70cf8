use bitflags::bitflags;

bitflags! {
    /// Characteristic and descriptor properties, using the radio stack's
    /// ATT property bit values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Properties: u16 {
        const BROADCAST = 0x0001;
        const READ = 0x0002;
        const WRITE_WITHOUT_RESPONSE = 0x0004;
        const WRITE = 0x0008;
        const NOTIFY = 0x0010;
        const INDICATE = 0x0020;
        const AUTHENTICATED_SIGNED_WRITES = 0x0040;
        const EXTENDED_PROPERTIES = 0x0080;
        /// Value is served through the read/write callbacks instead of
        /// being copied into the stack's attribute database.
        const DYNAMIC = 0x0100;
    }
}

impl Properties {
    pub fn is_notify(&self) -> bool {
        self.contains(Properties::NOTIFY)
    }

    pub fn is_indicate(&self) -> bool {
        self.contains(Properties::INDICATE)
    }

    pub fn is_dynamic(&self) -> bool {
        self.contains(Properties::DYNAMIC)
    }

    /// Whether a client configuration descriptor belongs with these properties.
    pub fn needs_client_configuration(&self) -> bool {
        self.intersects(Properties::NOTIFY | Properties::INDICATE)
    }
}
