//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Image processing lifecycle status.
    ImageStatus {
        Queued = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
    }
}

impl ImageStatus {
    /// Human-readable name matching the `image_statuses` seed data.
    pub fn name(self) -> &'static str {
        match self {
            ImageStatus::Queued => "queued",
            ImageStatus::Processing => "processing",
            ImageStatus::Completed => "completed",
            ImageStatus::Failed => "failed",
        }
    }

    /// Map a database status ID back to the enum.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(ImageStatus::Queued),
            2 => Some(ImageStatus::Processing),
            3 => Some(ImageStatus::Completed),
            4 => Some(ImageStatus::Failed),
            _ => None,
        }
    }

    /// Parse a status name as it appears in API query parameters.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "queued" => Some(ImageStatus::Queued),
            "processing" => Some(ImageStatus::Processing),
            "completed" => Some(ImageStatus::Completed),
            "failed" => Some(ImageStatus::Failed),
            _ => None,
        }
    }
}
