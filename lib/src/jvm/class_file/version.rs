use super::{Deserialize, Serialize};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Class file format version (`minor_version` comes first in the file)
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub minor_version: u16,
    pub major_version: u16,
}

record!(Version {
    minor_version,
    major_version
});

impl Version {
    /// Java SE 6: the last version that accepts methods without a `StackMapTable`
    pub const JAVA6: Version = Version {
        minor_version: 0,
        major_version: 50,
    };

    /// Java SE 8: every method with branches needs a `StackMapTable`
    pub const JAVA8: Version = Version {
        minor_version: 0,
        major_version: 52,
    };
}
