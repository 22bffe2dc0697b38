//! Indicator-field table.
//!
//! Context and command payloads start with indicator words (CIF0..CIF3, CIF7)
//! whose set bits announce which fields follow. Fields appear in the order of
//! [`FIELD_TABLE`]: CIF0 fields from bit 31 down, then CIF1, CIF2 and CIF3.
//! Offsets are never stored; they come from folding field sizes over this
//! table.

use crate::numeric::try_unpack;
use crate::numeric::ByteOrder;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Indicator word a field or attribute bit lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndicatorWord {
    Cif0,
    Cif1,
    Cif2,
    Cif3,
    Cif7,
}

impl IndicatorWord {
    /// Words in wire order.
    pub const ALL: [IndicatorWord; 5] =
        [IndicatorWord::Cif0, IndicatorWord::Cif1, IndicatorWord::Cif2, IndicatorWord::Cif3, IndicatorWord::Cif7];

    /// CIF0 bit announcing this word; `None` for CIF0 itself.
    pub const fn enable_mask(self) -> Option<u32> {
        match self {
            IndicatorWord::Cif0 => None,
            IndicatorWord::Cif1 => Some(1 << 1),
            IndicatorWord::Cif2 => Some(1 << 2),
            IndicatorWord::Cif3 => Some(1 << 3),
            IndicatorWord::Cif7 => Some(1 << 7),
        }
    }
}

/// How many bytes a field occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldSize {
    Fixed(usize),
    /// OUI word, word count, then that many words of text
    GpsAscii,
    /// Two count words, then the four lists
    ContextAssociationLists,
    /// First word holds the total size in words in its low 24 bits
    SelfSized,
}

impl FieldSize {
    /// Size of the field whose first byte is at `offset`.
    pub fn measure(self, buf: &[u8], offset: usize) -> Result<usize> {
        match self {
            FieldSize::Fixed(n) => Ok(n),
            FieldSize::SelfSized => {
                let word: u32 = try_unpack(buf, offset, ByteOrder::BigEndian)?;
                Ok(((word & 0x00FF_FFFF) as usize).max(1) * 4)
            }
            FieldSize::GpsAscii => {
                let words: u32 = try_unpack(buf, offset + 4, ByteOrder::BigEndian)?;
                Ok(8 + words as usize * 4)
            }
            FieldSize::ContextAssociationLists => {
                let first: u32 = try_unpack(buf, offset, ByteOrder::BigEndian)?;
                let second: u32 = try_unpack(buf, offset + 4, ByteOrder::BigEndian)?;
                let source = (first >> 16) & 0x1FF;
                let system = first & 0x1FF;
                let vector = second >> 16;
                let asynchronous = second & 0x7FFF;
                let tags = if second & 0x8000 != 0 { asynchronous } else { 0 };
                Ok(8 + 4 * (source + system + vector + asynchronous + tags) as usize)
            }
        }
    }

    /// Smallest well-formed value of this size.
    pub fn empty_value(self) -> Vec<u8> {
        match self {
            FieldSize::Fixed(n) => vec![0; n],
            FieldSize::SelfSized => vec![0, 0, 0, 1],
            FieldSize::GpsAscii | FieldSize::ContextAssociationLists => vec![0; 8],
        }
    }
}

/// One row of the field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: CifField,
    pub word: IndicatorWord,
    pub bit: u32,
    pub size: FieldSize,
    pub name: &'static str,
}

impl FieldSpec {
    pub const fn mask(&self) -> u32 {
        1 << self.bit
    }
}

macro_rules! cif_fields {
    ($($variant:ident => $word:ident, $bit:literal, $size:expr, $name:literal;)*) => {
        /// Every indicator-announced field, in wire order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum CifField {
            $($variant),*
        }

        /// Field table in wire order; `FIELD_TABLE[f as usize].field == f`.
        pub static FIELD_TABLE: &[FieldSpec] = &[
            $(FieldSpec {
                field: CifField::$variant,
                word: IndicatorWord::$word,
                bit: $bit,
                size: $size,
                name: $name,
            }),*
        ];
    };
}

const W1: FieldSize = FieldSize::Fixed(4);
const W2: FieldSize = FieldSize::Fixed(8);
const UUID: FieldSize = FieldSize::Fixed(16);
const GEOLOCATION: FieldSize = FieldSize::Fixed(44);
const EPHEMERIS: FieldSize = FieldSize::Fixed(52);

cif_fields! {
    ReferencePointId => Cif0, 30, W1, "reference point identifier";
    Bandwidth => Cif0, 29, W2, "bandwidth";
    IfReferenceFrequency => Cif0, 28, W2, "IF reference frequency";
    RfReferenceFrequency => Cif0, 27, W2, "RF reference frequency";
    RfReferenceFrequencyOffset => Cif0, 26, W2, "RF reference frequency offset";
    IfBandOffset => Cif0, 25, W2, "IF band offset";
    ReferenceLevel => Cif0, 24, W1, "reference level";
    Gain => Cif0, 23, W1, "gain";
    OverRangeCount => Cif0, 22, W1, "over-range count";
    SampleRate => Cif0, 21, W2, "sample rate";
    TimeStampAdjustment => Cif0, 20, W2, "timestamp adjustment";
    TimeStampCalibration => Cif0, 19, W1, "timestamp calibration time";
    Temperature => Cif0, 18, W1, "temperature";
    DeviceIdentifier => Cif0, 17, W2, "device identifier";
    StateEventIndicators => Cif0, 16, W1, "state and event indicators";
    DataPayloadFormat => Cif0, 15, W2, "data payload format";
    FormattedGps => Cif0, 14, GEOLOCATION, "formatted GPS geolocation";
    FormattedIns => Cif0, 13, GEOLOCATION, "formatted INS geolocation";
    EcefEphemeris => Cif0, 12, EPHEMERIS, "ECEF ephemeris";
    RelativeEphemeris => Cif0, 11, EPHEMERIS, "relative ephemeris";
    EphemerisReferenceId => Cif0, 10, W1, "ephemeris reference identifier";
    GpsAscii => Cif0, 9, FieldSize::GpsAscii, "GPS ASCII";
    ContextAssociationLists => Cif0, 8, FieldSize::ContextAssociationLists, "context association lists";

    PhaseOffset => Cif1, 31, W1, "phase offset";
    Polarization => Cif1, 30, W1, "polarization";
    PointingVector => Cif1, 29, W1, "3-D pointing vector";
    PointingVectorStructure => Cif1, 28, FieldSize::SelfSized, "3-D pointing vector structure";
    SpatialScanType => Cif1, 27, W1, "spatial scan type";
    SpatialReferenceType => Cif1, 26, W1, "spatial reference type";
    BeamWidths => Cif1, 25, W1, "beam widths";
    Range => Cif1, 24, W1, "range";
    EbNoBer => Cif1, 20, W1, "Eb/No BER";
    Threshold => Cif1, 19, W1, "threshold";
    CompressionPoint => Cif1, 18, W1, "compression point";
    InterceptPoints => Cif1, 17, W1, "second and third order intercept points";
    SnrNoiseFigure => Cif1, 16, W1, "SNR and noise figure";
    AuxFrequency => Cif1, 15, W2, "aux frequency";
    AuxGain => Cif1, 14, W1, "aux gain";
    AuxBandwidth => Cif1, 13, W2, "aux bandwidth";
    ArrayOfCifs => Cif1, 11, FieldSize::SelfSized, "array of CIFs";
    Spectrum => Cif1, 10, EPHEMERIS, "spectrum";
    SectorStepScan => Cif1, 9, FieldSize::SelfSized, "sector/step scan";
    IndexList => Cif1, 7, FieldSize::SelfSized, "index list";
    DiscreteIo32 => Cif1, 6, W1, "discrete I/O (32 bit)";
    DiscreteIo64 => Cif1, 5, W2, "discrete I/O (64 bit)";
    HealthStatus => Cif1, 4, W1, "health status";
    V49SpecCompliance => Cif1, 3, W1, "V49 spec compliance";
    VersionBuildCode => Cif1, 2, W1, "version and build code";
    BufferSize => Cif1, 1, W2, "buffer size";

    Bind => Cif2, 31, W1, "bind";
    CitedSid => Cif2, 30, W1, "cited SID";
    SiblingSid => Cif2, 29, W1, "sibling SID";
    ParentSid => Cif2, 28, W1, "parent SID";
    ChildSid => Cif2, 27, W1, "child SID";
    CitedMessageId => Cif2, 26, W1, "cited message ID";
    ControlleeId => Cif2, 25, W1, "controllee ID";
    ControlleeUuid => Cif2, 24, UUID, "controllee UUID";
    ControllerId => Cif2, 23, W1, "controller ID";
    ControllerUuid => Cif2, 22, UUID, "controller UUID";
    InformationSource => Cif2, 21, W1, "information source";
    TrackId => Cif2, 20, W1, "track ID";
    CountryCode => Cif2, 19, W1, "country code";
    Operator => Cif2, 18, W1, "operator";
    PlatformClass => Cif2, 17, W1, "platform class";
    PlatformInstance => Cif2, 16, W1, "platform instance";
    PlatformDisplay => Cif2, 15, W1, "platform display";
    EmsDeviceClass => Cif2, 14, W1, "EMS device class";
    EmsDeviceType => Cif2, 13, W1, "EMS device type";
    EmsDeviceInstance => Cif2, 12, W1, "EMS device instance";
    ModulationClass => Cif2, 11, W1, "modulation class";
    ModulationType => Cif2, 10, W1, "modulation type";
    FunctionId => Cif2, 9, W1, "function ID";
    ModeId => Cif2, 8, W1, "mode ID";
    EventId => Cif2, 7, W1, "event ID";
    FunctionPriorityId => Cif2, 6, W1, "function priority ID";
    CommunicationPriorityId => Cif2, 5, W1, "communication priority ID";
    RfFootprint => Cif2, 4, W1, "RF footprint";
    RfFootprintRange => Cif2, 3, W1, "RF footprint range";

    TimeStampDetails => Cif3, 31, W2, "timestamp details";
    TimeStampSkew => Cif3, 30, W2, "timestamp skew";
    RiseTime => Cif3, 27, W2, "rise time";
    FallTime => Cif3, 26, W2, "fall time";
    OffsetTime => Cif3, 25, W2, "offset time";
    PulseWidth => Cif3, 24, W2, "pulse width";
    Period => Cif3, 23, W2, "period";
    Duration => Cif3, 22, W2, "duration";
    Dwell => Cif3, 21, W2, "dwell";
    Jitter => Cif3, 20, W2, "jitter";
    Age => Cif3, 17, W2, "age";
    ShelfLife => Cif3, 16, W2, "shelf life";
    AirTemperature => Cif3, 7, W1, "air temperature";
    SeaGroundTemperature => Cif3, 6, W1, "sea and ground temperature";
    Humidity => Cif3, 5, W1, "humidity";
    BarometricPressure => Cif3, 4, W1, "barometric pressure";
    SeaSwellState => Cif3, 3, W1, "sea and swell state";
    TroposphericState => Cif3, 2, W1, "tropospheric state";
    NetworkId => Cif3, 1, W1, "network ID";
}

impl CifField {
    pub fn spec(self) -> &'static FieldSpec {
        &FIELD_TABLE[self as usize]
    }

    pub fn word(self) -> IndicatorWord {
        self.spec().word
    }

    pub fn mask(self) -> u32 {
        self.spec().mask()
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn all() -> impl Iterator<Item = CifField> {
        FIELD_TABLE.iter().map(|spec| spec.field)
    }
}

/// CIF7 attribute qualifiers. With CIF7 present, every field carries one
/// value per enabled attribute, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Attribute {
    CurrentValue,
    Average,
    Median,
    StandardDeviation,
    MaxValue,
    MinValue,
    Precision,
    Accuracy,
    FirstDerivative,
    SecondDerivative,
    ThirdDerivative,
    Probability,
    Belief,
}

impl Attribute {
    pub const ALL: [Attribute; 13] = [
        Attribute::CurrentValue,
        Attribute::Average,
        Attribute::Median,
        Attribute::StandardDeviation,
        Attribute::MaxValue,
        Attribute::MinValue,
        Attribute::Precision,
        Attribute::Accuracy,
        Attribute::FirstDerivative,
        Attribute::SecondDerivative,
        Attribute::ThirdDerivative,
        Attribute::Probability,
        Attribute::Belief,
    ];

    /// Bit position in the CIF7 word.
    pub const fn bit(self) -> u32 {
        31 - self as u32
    }

    pub const fn mask(self) -> u32 {
        1 << self.bit()
    }

    /// Probability and belief are always one word, whatever the field width.
    pub const fn is_single_word(self) -> bool {
        matches!(self, Attribute::Probability | Attribute::Belief)
    }

    /// Attributes enabled by a CIF7 word, in wire order.
    pub fn from_word(word: u32) -> Vec<Attribute> {
        Self::ALL.into_iter().filter(|a| word & a.mask() != 0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_discriminant() {
        for (i, spec) in FIELD_TABLE.iter().enumerate() {
            assert_eq!(spec.field as usize, i, "{}", spec.name);
            assert_eq!(spec.field.spec(), spec);
        }
        assert_eq!(FIELD_TABLE.len(), 97);
    }

    #[test]
    fn table_is_in_wire_order() {
        for pair in FIELD_TABLE.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.word < b.word || (a.word == b.word && a.bit > b.bit), "{} before {}", a.name, b.name);
        }
    }

    #[test]
    fn cif0_fields_avoid_enable_bits() {
        let reserved = (1 << 31) | (1 << 7) | (1 << 3) | (1 << 2) | (1 << 1);
        for spec in FIELD_TABLE.iter().filter(|s| s.word == IndicatorWord::Cif0) {
            assert_eq!(spec.mask() & reserved, 0, "{}", spec.name);
        }
    }

    #[test]
    fn variable_sizes_are_read_from_the_value() -> crate::Result<()> {
        assert_eq!(FieldSize::SelfSized.measure(&[0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0], 0)?, 12);
        assert_eq!(FieldSize::GpsAscii.measure(&[0, 0, 0, 0, 0, 0, 0, 2], 0)?, 16);
        // 1 source, 2 system, 0 vector, 1 async with tags
        let cal = [0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x80, 0x01];
        assert_eq!(FieldSize::ContextAssociationLists.measure(&cal, 0)?, 8 + 4 * 5);
        assert!(FieldSize::GpsAscii.measure(&[0, 0, 0, 0], 0).is_err());
        Ok(())
    }

    #[test]
    fn attributes_follow_cif7_bit_order() {
        assert_eq!(Attribute::CurrentValue.bit(), 31);
        assert_eq!(Attribute::Belief.bit(), 19);
        assert_eq!(
            Attribute::from_word(Attribute::MinValue.mask() | Attribute::CurrentValue.mask()),
            vec![Attribute::CurrentValue, Attribute::MinValue]
        );
    }
}
