//! Bundled service and characteristic catalogue.
//!
//! Standard entries follow the Bluetooth SIG assigned numbers; vendor entries
//! describe the motorised shade firmware. The table is read-only at runtime.

use uuid::Uuid;

use crate::codec::{uuid_from_u16, uuid_on_base};
use crate::definitions::value::{Decoder, Encoding};

pub const CATALOGUE_VERSION: &str = "2024.10-1";

/// Base UUID of the shade vendor services.
pub const VENDOR_BASE_UUID: u128 = 0x00000000_b87f_490c_92cb_11ba5ea5167c;

pub const fn vendor_uuid(short: u16) -> Uuid {
    uuid_on_base(VENDOR_BASE_UUID, short)
}

pub const TIME_SERVICE: Uuid = vendor_uuid(0x1870);
pub const MOTOR_SERVICE: Uuid = vendor_uuid(0x1861);
pub const SHADE_SERVICE: Uuid = vendor_uuid(0x1880);

pub struct ServiceEntry {
    pub uuid: Uuid,
    pub name: &'static str,
    pub characteristics: &'static [CharacteristicEntry],
}

pub struct CharacteristicEntry {
    pub uuid: Uuid,
    pub name: &'static str,
    pub decoder: Decoder,
    pub encoding: Option<Encoding>,
}

const fn entry(
    short: u16,
    name: &'static str,
    decoder: Decoder,
    encoding: Option<Encoding>,
) -> CharacteristicEntry {
    CharacteristicEntry {
        uuid: uuid_from_u16(short),
        name,
        decoder,
        encoding,
    }
}

const fn vendor(
    short: u16,
    name: &'static str,
    decoder: Decoder,
    encoding: Option<Encoding>,
) -> CharacteristicEntry {
    CharacteristicEntry {
        uuid: vendor_uuid(short),
        name,
        decoder,
        encoding,
    }
}

const PERCENT: Encoding = Encoding::Unsigned {
    width: 1,
    min: 0,
    max: 100,
};

pub static SERVICES: &[ServiceEntry] = &[
    ServiceEntry {
        uuid: uuid_from_u16(0x1800),
        name: "Generic Access",
        characteristics: &[
            entry(0x2a00, "Device Name", Decoder::Utf8, Some(Encoding::Utf8 { max_len: 248 })),
            entry(0x2a01, "Appearance", Decoder::U16, None),
            entry(0x2a04, "Peripheral Preferred Connection Parameters", Decoder::Hex, None),
        ],
    },
    ServiceEntry {
        uuid: uuid_from_u16(0x1801),
        name: "Generic Attribute",
        characteristics: &[entry(0x2a05, "Service Changed", Decoder::Hex, None)],
    },
    ServiceEntry {
        uuid: uuid_from_u16(0x180a),
        name: "Device Information",
        characteristics: &[
            entry(0x2a29, "Manufacturer Name String", Decoder::CString, None),
            entry(0x2a24, "Model Number String", Decoder::CString, None),
            entry(0x2a25, "Serial Number String", Decoder::CString, None),
            entry(0x2a27, "Hardware Revision String", Decoder::CString, None),
            entry(0x2a26, "Firmware Revision String", Decoder::CString, None),
            entry(0x2a28, "Software Revision String", Decoder::CString, None),
            entry(0x2a23, "System ID", Decoder::Hex, None),
            entry(0x2a50, "PnP ID", Decoder::Hex, None),
        ],
    },
    ServiceEntry {
        uuid: uuid_from_u16(0x180f),
        name: "Battery",
        characteristics: &[entry(0x2a19, "Battery Level", Decoder::Percent, None)],
    },
    ServiceEntry {
        uuid: uuid_from_u16(0x1805),
        name: "Current Time",
        characteristics: &[
            entry(
                0x2a2b,
                "Current Time",
                Decoder::GattDateTime,
                Some(Encoding::GattDateTime),
            ),
            entry(0x2a0f, "Local Time Information", Decoder::Hex, None),
        ],
    },
    ServiceEntry {
        uuid: TIME_SERVICE,
        name: "Time",
        characteristics: &[
            vendor(0x1871, "Current Time", Decoder::UnixTime, Some(Encoding::UnixTime)),
            vendor(
                0x1872,
                "UTC Offset",
                Decoder::I16,
                Some(Encoding::Signed {
                    width: 2,
                    min: -720,
                    max: 840,
                }),
            ),
        ],
    },
    ServiceEntry {
        uuid: MOTOR_SERVICE,
        name: "Motor",
        characteristics: &[
            vendor(0x1525, "Position", Decoder::Percent, None),
            vendor(0x1526, "Target Position", Decoder::Percent, Some(PERCENT)),
            vendor(
                0x1530,
                "Motor Control",
                Decoder::U8,
                Some(Encoding::Unsigned {
                    width: 1,
                    min: 0,
                    max: 0xff,
                }),
            ),
            vendor(0x1527, "Trigger Control", Decoder::Hex, Some(Encoding::Raw)),
            vendor(0x1528, "Trigger Response", Decoder::Hex, None),
        ],
    },
    ServiceEntry {
        uuid: SHADE_SERVICE,
        name: "Shade",
        characteristics: &[
            vendor(0x1881, "Configuration", Decoder::Hex, Some(Encoding::Raw)),
            vendor(0x1882, "Configuration Response", Decoder::Hex, None),
            vendor(0x1892, "Name", Decoder::CString, Some(Encoding::CString { width: 20 })),
            vendor(0x1893, "Group", Decoder::Hex, Some(Encoding::Raw)),
        ],
    },
];
