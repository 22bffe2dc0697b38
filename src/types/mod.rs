//! Value types shared by the packet, frame and archive codecs.
//!
//! ## Architecture
//!
//! - [`PacketType`] is the 4-bit type code of the header word
//! - [`ClassId`] and [`TimeStamp`] are the optional header sections
//! - [`PayloadFormat`] is the packed 64-bit sample format descriptor, built from a
//!   [`DataType`] or field by field
//! - [`StateEventIndicators`] is the data trailer / context state word
//! - [`ResponseCode`] is the warning/error bit set of acknowledge packets
//!
//! ## Usage Example
//!
//! ```rust
//! use vrt_codec::types::{DataType, PayloadFormat};
//!
//! let format = PayloadFormat::from_data_type(DataType::Int16);
//! assert!(format.is_valid());
//! assert_eq!(format.data_item_size(), 16);
//! assert_eq!(format.scalar_data_length(64), 32);
//! ```

mod class_id;
mod indicators;
mod packet_type;
mod payload_format;
mod response_code;
mod time_stamp;

pub use class_id::{ClassId, MAX_OUI};
pub use indicators::{Indicator, StateEventIndicators};
pub use packet_type::PacketType;
pub use payload_format::{DataItemFormat, DataType, PayloadFormat, RealComplexType};
pub use response_code::ResponseCode;
pub use time_stamp::{
    FixedLeapSeconds, FractionalMode, GPS_EPOCH_UTC, IntegerMode, ONE_SECOND_PICOS, TimeAuthority,
    TimeStamp,
};
