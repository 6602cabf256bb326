//! Shared value types
use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(
    transparent,
    bound(
        serialize = "DateTime<T>: Serialize",
        deserialize = "DateTime<T>: Deserialize<'de>"
    )
)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .unwrap_or_default()
            .into()
    }
    /// RFC 7231 form used for `If-Unmodified-Since`
    pub fn to_http_date(&self) -> String {
        self.0.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }
}

// ordering delegates to the inner DateTime; a derive would also require `T: Ord`, which Utc lacks
impl<T: TimeZone + PartialEq> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl<T: TimeZone + Eq> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

// the dashboards render every date in the operator's local offset
pub fn local_offset(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}

/// India Standard Time, the offset every localvan booking is entered in.
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or(Utc.fix())
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamp_reads_api_json() {
        let ts: TimeStamp<Utc> = serde_json::from_str("\"2025-03-01T10:15:00Z\"").unwrap();
        assert_eq!(ts, TimeStamp::new_with(2025, 3, 1, 10, 15, 0));
    }

    #[test]
    fn http_date_format() {
        let ts = TimeStamp::new_with(2025, 3, 1, 10, 15, 0);
        assert_eq!(ts.to_http_date(), "Sat, 01 Mar 2025 10:15:00 GMT");
    }

    #[test]
    fn ist_is_five_thirty_east() {
        assert_eq!(ist().local_minus_utc(), 19_800);
        assert_eq!(local_offset(330), Some(ist()));
    }

    #[test]
    fn huge_offsets_are_none() {
        assert_eq!(local_offset(100_000_000), None);
        assert_eq!(local_offset(i32::MIN), None);
        assert_eq!(local_offset(24 * 60), None);
    }
}
