//! Built-in XSD datatypes and constraining facets.
//!
//! A compiled [`SimpleType`] pairs a resolved built-in (the primitive or
//! derived type at the bottom of the restriction chain) with the merged
//! facet set collected along that chain. Validation is a pure function of
//! the lexical value.

use bigdecimal::BigDecimal;
use lazy_static::lazy_static;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use xmlkit_syntax::types::{FacetKind, QName};

lazy_static! {
    static ref DATETIME_RE: regex::Regex = regex::Regex::new(
        r"^-?\d{4,}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$"
    )
    .unwrap();
    static ref TIME_RE: regex::Regex =
        regex::Regex::new(r"^\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref DURATION_RE: regex::Regex = regex::Regex::new(
        r"^-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$"
    )
    .unwrap();
    static ref GYEAR_RE: regex::Regex = regex::Regex::new(r"^-?\d{4,}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref GYEARMONTH_RE: regex::Regex =
        regex::Regex::new(r"^-?\d{4,}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref GMONTH_RE: regex::Regex = regex::Regex::new(r"^--\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref GMONTHDAY_RE: regex::Regex =
        regex::Regex::new(r"^--\d{2}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref GDAY_RE: regex::Regex = regex::Regex::new(r"^---\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref LANG_RE: regex::Regex =
        regex::Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap();
    static ref BASE64_RE: regex::Regex = regex::Regex::new(r"^[A-Za-z0-9+/\s]*={0,2}$").unwrap();
    static ref HEXBINARY_RE: regex::Regex = regex::Regex::new(r"^([0-9A-Fa-f]{2})*$").unwrap();
}

/// Collapse whitespace the way `xs:token` does: leading/trailing stripped,
/// internal runs reduced to a single space.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace each tab/CR/LF with a space, preserving length.
pub fn replace_whitespace(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '\t' | '\r' | '\n') { ' ' } else { c })
        .collect()
}

/// The XSD built-in type backing a simple type's value space.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum Builtin {
    AnySimpleType,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NcName,
    NmToken,
    NmTokens,
    Id,
    IdRef,
    Entity,
    QName,
    AnyUri,
    Boolean,
    Decimal,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    PositiveInteger,
    Float,
    Double,
    Duration,
    DateTime,
    Time,
    Date,
    GYearMonth,
    GYear,
    GMonthDay,
    GDay,
    GMonth,
    HexBinary,
    Base64Binary,
}

impl Builtin {
    pub fn from_local(name: &str) -> Option<Builtin> {
        Some(match name {
            "anySimpleType" | "anyType" => Builtin::AnySimpleType,
            "string" => Builtin::String,
            "normalizedString" => Builtin::NormalizedString,
            "token" => Builtin::Token,
            "language" => Builtin::Language,
            "Name" => Builtin::Name,
            "NCName" => Builtin::NcName,
            "NMTOKEN" => Builtin::NmToken,
            "NMTOKENS" => Builtin::NmTokens,
            "ID" => Builtin::Id,
            "IDREF" | "IDREFS" => Builtin::IdRef,
            "ENTITY" | "ENTITIES" => Builtin::Entity,
            "QName" | "NOTATION" => Builtin::QName,
            "anyURI" => Builtin::AnyUri,
            "boolean" => Builtin::Boolean,
            "decimal" => Builtin::Decimal,
            "integer" => Builtin::Integer,
            "nonPositiveInteger" => Builtin::NonPositiveInteger,
            "negativeInteger" => Builtin::NegativeInteger,
            "long" => Builtin::Long,
            "int" => Builtin::Int,
            "short" => Builtin::Short,
            "byte" => Builtin::Byte,
            "nonNegativeInteger" => Builtin::NonNegativeInteger,
            "unsignedLong" => Builtin::UnsignedLong,
            "unsignedInt" => Builtin::UnsignedInt,
            "unsignedShort" => Builtin::UnsignedShort,
            "unsignedByte" => Builtin::UnsignedByte,
            "positiveInteger" => Builtin::PositiveInteger,
            "float" => Builtin::Float,
            "double" => Builtin::Double,
            "duration" => Builtin::Duration,
            "dateTime" => Builtin::DateTime,
            "time" => Builtin::Time,
            "date" => Builtin::Date,
            "gYearMonth" => Builtin::GYearMonth,
            "gYear" => Builtin::GYear,
            "gMonthDay" => Builtin::GMonthDay,
            "gDay" => Builtin::GDay,
            "gMonth" => Builtin::GMonth,
            "hexBinary" => Builtin::HexBinary,
            "base64Binary" => Builtin::Base64Binary,
            _ => return None,
        })
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Builtin::Decimal
                | Builtin::Integer
                | Builtin::NonPositiveInteger
                | Builtin::NegativeInteger
                | Builtin::Long
                | Builtin::Int
                | Builtin::Short
                | Builtin::Byte
                | Builtin::NonNegativeInteger
                | Builtin::UnsignedLong
                | Builtin::UnsignedInt
                | Builtin::UnsignedShort
                | Builtin::UnsignedByte
                | Builtin::PositiveInteger
                | Builtin::Float
                | Builtin::Double
        )
    }

    /// String-family types keep the value verbatim; everything else is
    /// whitespace-collapsed before lexical checks.
    pub fn collapses(&self) -> bool {
        !matches!(self, Builtin::String | Builtin::NormalizedString)
    }

    /// Lexical validity of `value` for this built-in, facets aside.
    pub fn lexical_ok(&self, value: &str) -> bool {
        match self {
            Builtin::AnySimpleType | Builtin::String | Builtin::AnyUri => true,
            Builtin::NormalizedString => !value.contains(['\t', '\r', '\n']),
            Builtin::Token => collapse_whitespace(value) == value,
            Builtin::Language => LANG_RE.is_match(value),
            Builtin::Name => is_valid_name(value),
            Builtin::NcName | Builtin::Id | Builtin::IdRef | Builtin::Entity => {
                is_valid_ncname(value)
            }
            Builtin::NmToken => is_valid_nmtoken(value),
            Builtin::NmTokens => {
                let tokens: Vec<&str> = value.split_ascii_whitespace().collect();
                !tokens.is_empty() && tokens.iter().all(|t| is_valid_nmtoken(t))
            }
            Builtin::QName => is_valid_qname(value),
            Builtin::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Builtin::Decimal => BigDecimal::from_str(value).is_ok(),
            Builtin::Integer => num_bigint::BigInt::from_str(value).is_ok(),
            Builtin::NonPositiveInteger => num_bigint::BigInt::from_str(value)
                .map(|v| v <= num_bigint::BigInt::from(0))
                .unwrap_or(false),
            Builtin::NegativeInteger => num_bigint::BigInt::from_str(value)
                .map(|v| v < num_bigint::BigInt::from(0))
                .unwrap_or(false),
            Builtin::Long => i64::from_str(value).is_ok(),
            Builtin::Int => i32::from_str(value).is_ok(),
            Builtin::Short => i16::from_str(value).is_ok(),
            Builtin::Byte => i8::from_str(value).is_ok(),
            Builtin::NonNegativeInteger => num_bigint::BigUint::from_str(value).is_ok(),
            Builtin::UnsignedLong => u64::from_str(value).is_ok(),
            Builtin::UnsignedInt => u32::from_str(value).is_ok(),
            Builtin::UnsignedShort => u16::from_str(value).is_ok(),
            Builtin::UnsignedByte => u8::from_str(value).is_ok(),
            Builtin::PositiveInteger => num_bigint::BigUint::from_str(value)
                .map(|v| v >= num_bigint::BigUint::from(1u32))
                .unwrap_or(false),
            Builtin::Float => value.parse::<f32>().is_ok() || matches!(value, "INF" | "-INF" | "NaN"),
            Builtin::Double => {
                value.parse::<f64>().is_ok() || matches!(value, "INF" | "-INF" | "NaN")
            }
            Builtin::Duration => value != "P" && DURATION_RE.is_match(value),
            Builtin::DateTime => DATETIME_RE.is_match(value),
            Builtin::Time => TIME_RE.is_match(value),
            Builtin::Date => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
            Builtin::GYearMonth => GYEARMONTH_RE.is_match(value),
            Builtin::GYear => GYEAR_RE.is_match(value),
            Builtin::GMonthDay => GMONTHDAY_RE.is_match(value),
            Builtin::GDay => GDAY_RE.is_match(value),
            Builtin::GMonth => GMONTH_RE.is_match(value),
            Builtin::HexBinary => HEXBINARY_RE.is_match(value),
            Builtin::Base64Binary => BASE64_RE.is_match(value),
        }
    }
}

fn is_valid_ncname(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        None => false,
        Some(first) => is_ncname_start_char(first) && chars.all(is_ncname_char),
    }
}

fn is_ncname_start_char(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ncname_char(c: char) -> bool {
    is_ncname_start_char(c) || c == '-' || c == '.' || c.is_ascii_digit()
}

fn is_valid_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        None => false,
        Some(first) => {
            (first == ':' || is_ncname_start_char(first))
                && chars.all(|c| c == ':' || is_ncname_char(c))
        }
    }
}

fn is_valid_nmtoken(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c == ':' || is_ncname_char(c))
}

fn is_valid_qname(text: &str) -> bool {
    match text.split_once(':') {
        Some((prefix, local)) => is_valid_ncname(prefix) && is_valid_ncname(local),
        None => is_valid_ncname(text),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FacetError {
    #[error("conflicting facet: {0}")]
    Conflicting(&'static str),
    #[error("invalid integer {0:?} in facet")]
    InvalidInt(String),
    #[error("invalid decimal {0:?} in facet")]
    InvalidDecimal(String),
    #[error("invalid pattern facet: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("invalid facet value {0:?}")]
    Invalid(String),
}

/// Length restrictions, counting in the unit proper to the base type
/// (characters for strings, octets for binary, items for lists).
#[derive(PartialEq, Eq, Hash, Clone, Debug, Default)]
pub enum LengthFacet {
    #[default]
    Unbounded,
    MinLength(usize),
    MaxLength(usize),
    MinMaxLength(usize, usize),
    Length(usize),
}

impl LengthFacet {
    pub fn check(&self, actual: usize) -> bool {
        match self {
            LengthFacet::Unbounded => true,
            LengthFacet::MinLength(min) => *min <= actual,
            LengthFacet::MaxLength(max) => actual <= *max,
            LengthFacet::MinMaxLength(min, max) => *min <= actual && actual <= *max,
            LengthFacet::Length(len) => actual == *len,
        }
    }

    pub fn is_valid(&self, value: &str) -> bool {
        self.check(value.chars().count())
    }

    pub fn min_len(&self) -> Option<usize> {
        match self {
            LengthFacet::Unbounded | LengthFacet::MaxLength(_) => None,
            LengthFacet::MinLength(min) | LengthFacet::MinMaxLength(min, _) => Some(*min),
            LengthFacet::Length(len) => Some(*len),
        }
    }

    pub fn max_len(&self) -> Option<usize> {
        match self {
            LengthFacet::Unbounded | LengthFacet::MinLength(_) => None,
            LengthFacet::MaxLength(max) | LengthFacet::MinMaxLength(_, max) => Some(*max),
            LengthFacet::Length(len) => Some(*len),
        }
    }

    fn merge_min(&mut self, min: usize) -> Result<(), FacetError> {
        *self = match *self {
            LengthFacet::Unbounded => LengthFacet::MinLength(min),
            LengthFacet::MaxLength(max) => {
                if min > max {
                    return Err(FacetError::Conflicting("minLength greater than maxLength"));
                }
                LengthFacet::MinMaxLength(min, max)
            }
            // Derived types may only narrow; keep the tighter bound.
            LengthFacet::MinLength(prev) => LengthFacet::MinLength(prev.max(min)),
            LengthFacet::MinMaxLength(prev, max) => {
                if min > max {
                    return Err(FacetError::Conflicting("minLength greater than maxLength"));
                }
                LengthFacet::MinMaxLength(prev.max(min), max)
            }
            LengthFacet::Length(_) => {
                return Err(FacetError::Conflicting("minLength combined with length"));
            }
        };
        Ok(())
    }

    fn merge_max(&mut self, max: usize) -> Result<(), FacetError> {
        *self = match *self {
            LengthFacet::Unbounded => LengthFacet::MaxLength(max),
            LengthFacet::MinLength(min) => {
                if min > max {
                    return Err(FacetError::Conflicting("minLength greater than maxLength"));
                }
                LengthFacet::MinMaxLength(min, max)
            }
            LengthFacet::MaxLength(prev) => LengthFacet::MaxLength(prev.min(max)),
            LengthFacet::MinMaxLength(min, prev) => {
                if min > max {
                    return Err(FacetError::Conflicting("minLength greater than maxLength"));
                }
                LengthFacet::MinMaxLength(min, prev.min(max))
            }
            LengthFacet::Length(_) => {
                return Err(FacetError::Conflicting("maxLength combined with length"));
            }
        };
        Ok(())
    }

    fn merge_exact(&mut self, len: usize) -> Result<(), FacetError> {
        *self = match *self {
            LengthFacet::Unbounded => LengthFacet::Length(len),
            LengthFacet::Length(prev) if prev == len => LengthFacet::Length(len),
            _ => return Err(FacetError::Conflicting("length combined with other length facet")),
        };
        Ok(())
    }
}

#[derive(PartialEq, Clone, Debug, Default)]
enum Min {
    #[default]
    Unbounded,
    Inclusive(BigDecimal),
    Exclusive(BigDecimal),
}

impl Min {
    fn is_valid(&self, v: &BigDecimal) -> bool {
        match self {
            Min::Unbounded => true,
            Min::Inclusive(min) => min <= v,
            Min::Exclusive(min) => min < v,
        }
    }
}

#[derive(PartialEq, Clone, Debug, Default)]
enum Max {
    #[default]
    Unbounded,
    Inclusive(BigDecimal),
    Exclusive(BigDecimal),
}

impl Max {
    fn is_valid(&self, v: &BigDecimal) -> bool {
        match self {
            Max::Unbounded => true,
            Max::Inclusive(max) => v <= max,
            Max::Exclusive(max) => v < max,
        }
    }
}

/// Numeric range restriction accumulated over a derivation chain.
#[derive(PartialEq, Clone, Debug, Default)]
pub struct MinMaxFacet {
    min: Min,
    max: Max,
}

impl MinMaxFacet {
    pub fn bounded(&self) -> bool {
        !matches!((&self.min, &self.max), (Min::Unbounded, Max::Unbounded))
    }

    pub fn is_valid(&self, v: &BigDecimal) -> bool {
        self.min.is_valid(v) && self.max.is_valid(v)
    }

    /// The smallest value a sample may take. Exclusive bounds are nudged
    /// by one, which is exact for the integer types where exclusive
    /// bounds actually occur.
    pub fn min_value(&self) -> Option<BigDecimal> {
        match &self.min {
            Min::Unbounded => None,
            Min::Inclusive(min) => Some(min.clone()),
            Min::Exclusive(min) => Some(min + BigDecimal::from(1)),
        }
    }

    pub fn max_value(&self) -> Option<BigDecimal> {
        match &self.max {
            Max::Unbounded => None,
            Max::Inclusive(max) => Some(max.clone()),
            Max::Exclusive(max) => Some(max - BigDecimal::from(1)),
        }
    }

    fn check_against_max(&self, val: &BigDecimal) -> Result<(), FacetError> {
        match &self.max {
            Max::Unbounded => Ok(()),
            Max::Inclusive(max) if val > max => {
                Err(FacetError::Conflicting("lower bound exceeds maxInclusive"))
            }
            Max::Exclusive(max) if val >= max => {
                Err(FacetError::Conflicting("lower bound exceeds maxExclusive"))
            }
            _ => Ok(()),
        }
    }

    fn check_against_min(&self, val: &BigDecimal) -> Result<(), FacetError> {
        match &self.min {
            Min::Unbounded => Ok(()),
            Min::Inclusive(min) if min > val => {
                Err(FacetError::Conflicting("upper bound below minInclusive"))
            }
            Min::Exclusive(min) if min >= val => {
                Err(FacetError::Conflicting("upper bound below minExclusive"))
            }
            _ => Ok(()),
        }
    }

    fn min_inclusive(&mut self, val: BigDecimal) -> Result<(), FacetError> {
        self.check_against_max(&val)?;
        self.min = match &self.min {
            Min::Unbounded => Min::Inclusive(val),
            // Restriction may tighten an inherited bound.
            Min::Inclusive(prev) => Min::Inclusive(if &val > prev { val } else { prev.clone() }),
            Min::Exclusive(_) => {
                return Err(FacetError::Conflicting("minInclusive conflicts with minExclusive"));
            }
        };
        Ok(())
    }

    fn min_exclusive(&mut self, val: BigDecimal) -> Result<(), FacetError> {
        self.check_against_max(&val)?;
        self.min = match &self.min {
            Min::Unbounded => Min::Exclusive(val),
            Min::Exclusive(prev) => Min::Exclusive(if &val > prev { val } else { prev.clone() }),
            Min::Inclusive(_) => {
                return Err(FacetError::Conflicting("minExclusive conflicts with minInclusive"));
            }
        };
        Ok(())
    }

    fn max_inclusive(&mut self, val: BigDecimal) -> Result<(), FacetError> {
        self.check_against_min(&val)?;
        self.max = match &self.max {
            Max::Unbounded => Max::Inclusive(val),
            Max::Inclusive(prev) => Max::Inclusive(if &val < prev { val } else { prev.clone() }),
            Max::Exclusive(_) => {
                return Err(FacetError::Conflicting("maxInclusive conflicts with maxExclusive"));
            }
        };
        Ok(())
    }

    fn max_exclusive(&mut self, val: BigDecimal) -> Result<(), FacetError> {
        self.check_against_min(&val)?;
        self.max = match &self.max {
            Max::Unbounded => Max::Exclusive(val),
            Max::Exclusive(prev) => Max::Exclusive(if &val < prev { val } else { prev.clone() }),
            Max::Inclusive(_) => {
                return Err(FacetError::Conflicting("maxExclusive conflicts with maxInclusive"));
            }
        };
        Ok(())
    }
}

/// A compiled `pattern` facet. Equality and hashing use the source
/// expression; the compiled automaton is derived state.
#[derive(Clone)]
pub struct PatternFacet {
    source: String,
    regex: regex::Regex,
}

impl PatternFacet {
    pub fn new(pattern: &str) -> Result<PatternFacet, FacetError> {
        // XSD patterns match the whole value.
        let regex = regex::Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(PatternFacet {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for PatternFacet {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
impl Eq for PatternFacet {}

impl fmt::Debug for PatternFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("PatternFacet").field(&self.source).finish()
    }
}

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

/// The merged facet set of one simple type.
#[derive(PartialEq, Clone, Debug, Default)]
pub struct Facets {
    pub length: LengthFacet,
    pub pattern: Option<PatternFacet>,
    pub enumeration: Vec<String>,
    pub white_space: Option<WhiteSpace>,
    pub bounds: MinMaxFacet,
    pub total_digits: Option<u16>,
    pub fraction_digits: Option<u16>,
    /// XSD 1.1 assertion facets, kept for serialization; not evaluated.
    pub assertions: Vec<String>,
}

impl Facets {
    pub fn apply(&mut self, kind: FacetKind, value: &str) -> Result<(), FacetError> {
        let usize_of = |v: &str| {
            v.parse::<usize>()
                .map_err(|_| FacetError::InvalidInt(v.to_string()))
        };
        let decimal_of = |v: &str| {
            BigDecimal::from_str(v).map_err(|_| FacetError::InvalidDecimal(v.to_string()))
        };
        match kind {
            FacetKind::Pattern => {
                // Multiple patterns within one restriction step would OR;
                // across steps they AND. A single compiled pattern covers
                // the common single-pattern case; later patterns replace.
                self.pattern = Some(PatternFacet::new(value)?);
            }
            FacetKind::Enumeration => self.enumeration.push(value.to_string()),
            FacetKind::MinInclusive => self.bounds.min_inclusive(decimal_of(value)?)?,
            FacetKind::MaxInclusive => self.bounds.max_inclusive(decimal_of(value)?)?,
            FacetKind::MinExclusive => self.bounds.min_exclusive(decimal_of(value)?)?,
            FacetKind::MaxExclusive => self.bounds.max_exclusive(decimal_of(value)?)?,
            FacetKind::Length => self.length.merge_exact(usize_of(value)?)?,
            FacetKind::MinLength => self.length.merge_min(usize_of(value)?)?,
            FacetKind::MaxLength => self.length.merge_max(usize_of(value)?)?,
            FacetKind::TotalDigits => {
                let digits = value
                    .parse::<u16>()
                    .map_err(|_| FacetError::InvalidInt(value.to_string()))?;
                if digits == 0 {
                    return Err(FacetError::Invalid(value.to_string()));
                }
                self.total_digits = Some(digits);
            }
            FacetKind::FractionDigits => {
                self.fraction_digits = Some(
                    value
                        .parse::<u16>()
                        .map_err(|_| FacetError::InvalidInt(value.to_string()))?,
                );
            }
            FacetKind::WhiteSpace => {
                self.white_space = Some(match value {
                    "preserve" => WhiteSpace::Preserve,
                    "replace" => WhiteSpace::Replace,
                    "collapse" => WhiteSpace::Collapse,
                    other => return Err(FacetError::Invalid(other.to_string())),
                });
            }
            FacetKind::Assertion => self.assertions.push(value.to_string()),
        }
        Ok(())
    }

    fn numeric_ok(&self, value: &str) -> bool {
        let Ok(v) = BigDecimal::from_str(value) else {
            // INF/NaN floats carry no decimal value to range-check.
            return true;
        };
        if !self.bounds.is_valid(&v) {
            return false;
        }
        if let Some(fd) = self.fraction_digits {
            let digits = value.rsplit_once('.').map(|(_, f)| f.len()).unwrap_or(0);
            if digits > fd as usize {
                return false;
            }
        }
        if let Some(td) = self.total_digits {
            let digits = value
                .chars()
                .filter(|c| c.is_ascii_digit())
                .count();
            if digits > td as usize {
                return false;
            }
        }
        true
    }

    pub fn is_valid(&self, value: &str, builtin: Builtin) -> bool {
        if !self.enumeration.is_empty() && !self.enumeration.iter().any(|e| e == value) {
            return false;
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_valid(value) {
                return false;
            }
        }
        let length_ok = match builtin {
            Builtin::HexBinary => self.length.check(value.len() / 2),
            Builtin::Base64Binary => {
                let stripped: String =
                    value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                let pad = stripped.chars().rev().take_while(|&c| c == '=').count();
                let octets = if stripped.is_empty() {
                    0
                } else {
                    stripped.len() * 3 / 4 - pad
                };
                self.length.check(octets)
            }
            Builtin::NmTokens => self.length.check(value.split_ascii_whitespace().count()),
            _ => self.length.is_valid(value),
        };
        if !length_ok {
            return false;
        }
        if builtin.is_numeric() && !self.numeric_ok(value) {
            return false;
        }
        true
    }
}

/// How the simple type's value space is composed.
#[derive(PartialEq, Clone, Debug)]
pub enum Variety {
    Atomic,
    List { item: Rc<SimpleType> },
    Union { members: Vec<Rc<SimpleType>> },
}

/// A fully compiled simple type: restriction chain resolved to a built-in,
/// facets merged along the way.
#[derive(PartialEq, Clone, Debug)]
pub struct SimpleType {
    pub name: Option<QName>,
    /// Nearest named base in the restriction chain.
    pub base: QName,
    pub builtin: Builtin,
    pub variety: Variety,
    pub facets: Facets,
}

impl SimpleType {
    pub fn builtin(builtin: Builtin, name: &str) -> SimpleType {
        SimpleType {
            name: Some(QName::xsd(name)),
            base: QName::xsd("anySimpleType"),
            builtin,
            variety: Variety::Atomic,
            facets: Facets::default(),
        }
    }

    fn normalized<'v>(&self, value: &'v str) -> std::borrow::Cow<'v, str> {
        let ws = self.facets.white_space.unwrap_or({
            if self.builtin.collapses() {
                WhiteSpace::Collapse
            } else if self.builtin == Builtin::NormalizedString {
                WhiteSpace::Replace
            } else {
                WhiteSpace::Preserve
            }
        });
        match ws {
            WhiteSpace::Preserve => value.into(),
            WhiteSpace::Replace => replace_whitespace(value).into(),
            WhiteSpace::Collapse => collapse_whitespace(value).into(),
        }
    }

    pub fn is_valid(&self, value: &str) -> bool {
        match &self.variety {
            Variety::Atomic => {
                let value = self.normalized(value);
                self.builtin.lexical_ok(&value) && self.facets.is_valid(&value, self.builtin)
            }
            Variety::List { item } => {
                let normalized = collapse_whitespace(value);
                let items: Vec<&str> = normalized.split_ascii_whitespace().collect();
                // Length facets on a list count items, not characters.
                self.facets.length.check(items.len())
                    && items.iter().all(|i| item.is_valid(i))
                    && self
                        .facets
                        .pattern
                        .as_ref()
                        .map(|p| p.is_valid(&normalized))
                        .unwrap_or(true)
                    && (self.facets.enumeration.is_empty()
                        || self.facets.enumeration.iter().any(|e| e == &normalized))
            }
            Variety::Union { members } => members.iter().any(|m| m.is_valid(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn atomic(builtin: Builtin) -> SimpleType {
        SimpleType::builtin(builtin, "test")
    }

    #[test]
    fn builtin_lexical_checks() {
        assert!(Builtin::Int.lexical_ok("42"));
        assert!(!Builtin::Int.lexical_ok("forty-two"));
        assert!(Builtin::Date.lexical_ok("2024-02-29"));
        assert!(!Builtin::Date.lexical_ok("2024-02-30"));
        assert!(Builtin::Boolean.lexical_ok("1"));
        assert!(!Builtin::Boolean.lexical_ok("yes"));
        assert!(Builtin::DateTime.lexical_ok("2024-05-01T12:00:00+02:00"));
        assert!(Builtin::Duration.lexical_ok("P1Y2M3DT4H5M6S"));
        assert!(!Builtin::Duration.lexical_ok("P"));
        assert!(Builtin::NcName.lexical_ok("invoice-line"));
        assert!(!Builtin::NcName.lexical_ok("9lives"));
    }

    #[test]
    fn enumeration_restricts_value_space() {
        let mut ty = atomic(Builtin::String);
        ty.facets.apply(FacetKind::Enumeration, "red").unwrap();
        ty.facets.apply(FacetKind::Enumeration, "green").unwrap();
        assert!(ty.is_valid("red"));
        assert!(!ty.is_valid("blue"));
    }

    #[test]
    fn pattern_is_anchored() {
        let mut ty = atomic(Builtin::String);
        ty.facets.apply(FacetKind::Pattern, "[A-Z]{2}-\\d+").unwrap();
        assert!(ty.is_valid("AB-123"));
        assert!(!ty.is_valid("xAB-123y"));
    }

    #[test]
    fn numeric_bounds_and_digits() {
        let mut ty = atomic(Builtin::Decimal);
        ty.facets.apply(FacetKind::MinInclusive, "0").unwrap();
        ty.facets.apply(FacetKind::MaxExclusive, "100").unwrap();
        ty.facets.apply(FacetKind::FractionDigits, "2").unwrap();
        assert!(ty.is_valid("99.99"));
        assert!(!ty.is_valid("100"));
        assert!(!ty.is_valid("-1"));
        assert!(!ty.is_valid("1.234"));
    }

    #[test]
    fn conflicting_bounds_are_rejected() {
        let mut facets = Facets::default();
        facets.apply(FacetKind::MinInclusive, "10").unwrap();
        assert_matches!(
            facets.apply(FacetKind::MaxInclusive, "5"),
            Err(FacetError::Conflicting(_))
        );
    }

    #[test]
    fn length_facets_merge_and_conflict() {
        let mut facets = Facets::default();
        facets.apply(FacetKind::MinLength, "2").unwrap();
        facets.apply(FacetKind::MaxLength, "4").unwrap();
        assert_eq!(facets.length, LengthFacet::MinMaxLength(2, 4));
        assert_matches!(
            facets.apply(FacetKind::Length, "3"),
            Err(FacetError::Conflicting(_))
        );
    }

    #[test]
    fn list_length_counts_items() {
        let item = Rc::new(atomic(Builtin::Int));
        let mut list = SimpleType {
            name: None,
            base: QName::xsd("anySimpleType"),
            builtin: Builtin::AnySimpleType,
            variety: Variety::List { item },
            facets: Facets::default(),
        };
        list.facets.apply(FacetKind::MaxLength, "2").unwrap();
        assert!(list.is_valid("1 2"));
        assert!(!list.is_valid("1 2 3"));
        assert!(!list.is_valid("1 x"));
    }

    #[test]
    fn token_collapses_before_checking() {
        let ty = atomic(Builtin::Token);
        assert!(ty.is_valid("  spaced   out  "));
    }
}
