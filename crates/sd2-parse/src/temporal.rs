//! Built-in temporal constructors.
//!
//! [`registry()`] returns the default constructor registry with `date`,
//! `time`, `instant`, `duration`, and `period` registered under the
//! `temporal.*` type tags. Each constructor takes a single string argument.
//!
//! Shape checks are performed by hand because the E3xxx codes distinguish
//! failures (wrong shape, over-long fractions, misplaced designators) that
//! chrono's own parsers collapse into one error; chrono then supplies the
//! calendar and clock validation.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta};

use crate::registry::{ConstructorCall, ConstructorRegistry, ResolveContext};
use crate::value::ObjectPayload;
use crate::{ErrorCode, ParseError, Value};

/// Nanoseconds in one day.
const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/// A calendar period of years, months, and days.
///
/// Weeks from the source text are already expanded to days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    /// Whole years.
    pub years: u32,
    /// Whole months.
    pub months: u32,
    /// Whole days.
    pub days: u32,
}

/// The default registry with the five temporal constructors.
pub fn registry() -> ConstructorRegistry {
    let mut registry = ConstructorRegistry::new();
    registry.register("date", "temporal.date", |call, ctx| {
        parse_date(string_arg(call, ctx)?, ctx).map(ObjectPayload::new)
    });
    registry.register("time", "temporal.time", |call, ctx| {
        parse_time(string_arg(call, ctx)?, ctx).map(ObjectPayload::new)
    });
    registry.register("instant", "temporal.instant", |call, ctx| {
        parse_instant(string_arg(call, ctx)?, ctx).map(ObjectPayload::new)
    });
    registry.register("duration", "temporal.duration", |call, ctx| {
        parse_duration(string_arg(call, ctx)?, ctx).map(ObjectPayload::new)
    });
    registry.register("period", "temporal.period", |call, ctx| {
        parse_period(string_arg(call, ctx)?, ctx).map(ObjectPayload::new)
    });
    registry
}

/// Extract the single string argument every temporal constructor expects.
fn string_arg<'a>(
    call: &'a ConstructorCall,
    ctx: &ResolveContext<'_>,
) -> Result<&'a str, ParseError> {
    match (call.args.as_slice(), call.attrs.as_slice()) {
        ([Value::String { value, .. }], []) => Ok(value),
        _ => Err(ctx.error(
            ErrorCode::E3001,
            format!("{} expects a single string argument", call.name),
            None,
        )),
    }
}

fn parse_date(text: &str, ctx: &ResolveContext<'_>) -> Result<NaiveDate, ParseError> {
    let bytes = text.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && [0, 1, 2, 3, 5, 6, 8, 9]
            .iter()
            .all(|&i| bytes[i].is_ascii_digit());
    if !shaped {
        return Err(ctx.error(
            ErrorCode::E3001,
            format!("date must have the form yyyy-mm-dd, got '{}'", text),
            None,
        ));
    }

    let year: i32 = text[0..4].parse().expect("checked digits");
    let month: u32 = text[5..7].parse().expect("checked digits");
    let day: u32 = text[8..10].parse().expect("checked digits");
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        ctx.error(
            ErrorCode::E3001,
            format!("'{}' is not a valid calendar date", text),
            None,
        )
    })
}

fn parse_time(text: &str, ctx: &ResolveContext<'_>) -> Result<NaiveTime, ParseError> {
    let bytes = text.as_bytes();
    let shaped = bytes.len() >= 8
        && bytes[2] == b':'
        && bytes[5] == b':'
        && [0, 1, 3, 4, 6, 7].iter().all(|&i| bytes[i].is_ascii_digit());
    if !shaped {
        return Err(ctx.error(
            ErrorCode::E3001,
            format!("time must have the form hh:mm:ss[.fraction], got '{}'", text),
            None,
        ));
    }

    let fraction = &text[8..];
    let nanos = if fraction.is_empty() {
        0
    } else {
        let digits = fraction.strip_prefix('.').filter(|d| {
            !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit())
        });
        let Some(digits) = digits else {
            return Err(ctx.error(
                ErrorCode::E3001,
                format!("time must have the form hh:mm:ss[.fraction], got '{}'", text),
                None,
            ));
        };
        fraction_nanos(digits, ctx, ErrorCode::E3003)?
    };

    let hour: u32 = text[0..2].parse().expect("checked digits");
    let minute: u32 = text[3..5].parse().expect("checked digits");
    let second: u32 = text[6..8].parse().expect("checked digits");
    NaiveTime::from_hms_nano_opt(hour, minute, second, nanos).ok_or_else(|| {
        ctx.error(
            ErrorCode::E3001,
            format!("'{}' is not a valid clock time", text),
            None,
        )
    })
}

fn parse_instant(
    text: &str,
    ctx: &ResolveContext<'_>,
) -> Result<DateTime<FixedOffset>, ParseError> {
    let bytes = text.as_bytes();
    let has_offset = text.ends_with('Z')
        || (bytes.len() >= 6
            && matches!(bytes[bytes.len() - 6], b'+' | b'-')
            && bytes[bytes.len() - 3] == b':'
            && [5, 4, 2, 1]
                .iter()
                .all(|&back| bytes[bytes.len() - back].is_ascii_digit()));
    if !has_offset {
        return Err(ctx.error(
            ErrorCode::E3001,
            format!("instant must end with 'Z' or a '+hh:mm' offset, got '{}'", text),
            None,
        ));
    }

    // The only '.' in an RFC 3339 timestamp starts the fractional seconds.
    if let Some(dot) = text.find('.') {
        let digits = text[dot + 1..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .count();
        if digits > 9 {
            return Err(ctx.error(
                ErrorCode::E3003,
                format!("fractional seconds support at most nine digits, got {}", digits),
                None,
            ));
        }
    }

    DateTime::parse_from_rfc3339(text).map_err(|_| {
        ctx.error(
            ErrorCode::E3001,
            format!("'{}' is not a valid instant", text),
            None,
        )
    })
}

fn parse_duration(text: &str, ctx: &ResolveContext<'_>) -> Result<TimeDelta, ParseError> {
    let shape_err = |ctx: &ResolveContext<'_>| {
        ctx.error(
            ErrorCode::E3001,
            format!("duration must have the form P[nD][T[nH][nM][nS]], got '{}'", text),
            None,
        )
    };

    let Some(rest) = text.strip_prefix('P') else {
        return Err(shape_err(ctx));
    };
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    let mut components = 0usize;
    let mut nanos: i64 = 0;
    let mut add = |n: i64| -> Result<(), ParseError> {
        nanos = nanos.checked_add(n).ok_or_else(|| {
            ctx.error(
                ErrorCode::E3001,
                format!("duration '{}' is out of range", text),
                None,
            )
        })?;
        Ok(())
    };

    for component in scan_components(date_part).map_err(|_| shape_err(ctx))? {
        components += 1;
        if component.fraction.is_some() {
            return Err(shape_err(ctx));
        }
        match component.designator {
            'D' => add(scaled(component.number, NANOS_PER_DAY, text, ctx)?)?,
            'Y' | 'M' | 'W' => {
                return Err(ctx.error(
                    ErrorCode::E3004,
                    format!(
                        "calendar component '{}' is not allowed in a duration",
                        component.designator
                    ),
                    None,
                ));
            }
            _ => return Err(shape_err(ctx)),
        }
    }

    if let Some(time_part) = time_part {
        for component in scan_components(time_part).map_err(|_| shape_err(ctx))? {
            components += 1;
            match component.designator {
                'H' => add(scaled(component.number, 3_600_000_000_000, text, ctx)?)?,
                'M' => add(scaled(component.number, 60_000_000_000, text, ctx)?)?,
                'S' => {
                    add(scaled(component.number, 1_000_000_000, text, ctx)?)?;
                    if let Some(fraction) = component.fraction {
                        add(fraction_nanos(fraction, ctx, ErrorCode::E3001)? as i64)?;
                        continue;
                    }
                }
                _ => return Err(shape_err(ctx)),
            }
            if component.fraction.is_some() {
                // Only the seconds component may carry a fraction.
                return Err(shape_err(ctx));
            }
        }
    }

    if components == 0 {
        return Err(ctx.error(
            ErrorCode::E3002,
            format!("duration '{}' has no components", text),
            None,
        ));
    }

    Ok(TimeDelta::nanoseconds(nanos))
}

fn parse_period(text: &str, ctx: &ResolveContext<'_>) -> Result<Period, ParseError> {
    let shape_err = |ctx: &ResolveContext<'_>| {
        ctx.error(
            ErrorCode::E3001,
            format!("period must have the form P[nY][nM][nW][nD], got '{}'", text),
            None,
        )
    };
    let time_err = |ctx: &ResolveContext<'_>, what: &str| {
        ctx.error(
            ErrorCode::E3005,
            format!("time component '{}' is not allowed in a period", what),
            None,
        )
    };

    let Some(rest) = text.strip_prefix('P') else {
        return Err(shape_err(ctx));
    };
    if rest.contains('T') {
        return Err(time_err(ctx, "T"));
    }

    let mut period = Period {
        years: 0,
        months: 0,
        days: 0,
    };
    let mut components = 0usize;
    let range_err = |ctx: &ResolveContext<'_>| {
        ctx.error(
            ErrorCode::E3001,
            format!("period '{}' is out of range", text),
            None,
        )
    };
    let to_u32 = |n: u64, ctx: &ResolveContext<'_>| -> Result<u32, ParseError> {
        u32::try_from(n).map_err(|_| range_err(ctx))
    };

    for component in scan_components(rest).map_err(|_| shape_err(ctx))? {
        components += 1;
        if component.fraction.is_some() {
            return Err(shape_err(ctx));
        }
        match component.designator {
            'Y' => period.years = to_u32(component.number, ctx)?,
            'M' => period.months = to_u32(component.number, ctx)?,
            'W' => {
                let days = component
                    .number
                    .checked_mul(7)
                    .and_then(|d| d.checked_add(period.days as u64))
                    .ok_or_else(|| range_err(ctx))?;
                period.days = to_u32(days, ctx)?;
            }
            'D' => {
                let days = component
                    .number
                    .checked_add(period.days as u64)
                    .ok_or_else(|| range_err(ctx))?;
                period.days = to_u32(days, ctx)?;
            }
            'H' | 'S' => return Err(time_err(ctx, &component.designator.to_string())),
            _ => return Err(shape_err(ctx)),
        }
    }

    if components == 0 {
        return Err(ctx.error(
            ErrorCode::E3002,
            format!("period '{}' has no components", text),
            None,
        ));
    }

    Ok(period)
}

/// One `<number><designator>` component of a duration or period.
struct Component<'a> {
    number: u64,
    designator: char,
    fraction: Option<&'a str>,
}

/// Scan `12D`-style components. Errors on a number without a designator,
/// a designator without a number, or stray characters.
fn scan_components(part: &str) -> Result<Vec<Component<'_>>, ()> {
    let bytes = part.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < part.len() {
        let digits_from = i;
        while i < part.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == digits_from {
            return Err(());
        }
        let number: u64 = part[digits_from..i].parse().map_err(|_| ())?;

        let mut fraction = None;
        if i < part.len() && bytes[i] == b'.' {
            let fraction_from = i + 1;
            i = fraction_from;
            while i < part.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i == fraction_from {
                return Err(());
            }
            fraction = Some(&part[fraction_from..i]);
        }

        if i >= part.len() {
            return Err(());
        }
        let designator = part[i..].chars().next().ok_or(())?;
        if !designator.is_ascii_uppercase() {
            return Err(());
        }
        i += designator.len_utf8();

        out.push(Component {
            number,
            designator,
            fraction,
        });
    }
    Ok(out)
}

/// Multiply a component count into nanoseconds, checked.
fn scaled(
    number: u64,
    unit_nanos: i64,
    text: &str,
    ctx: &ResolveContext<'_>,
) -> Result<i64, ParseError> {
    i64::try_from(number)
        .ok()
        .and_then(|n| n.checked_mul(unit_nanos))
        .ok_or_else(|| {
            ctx.error(
                ErrorCode::E3001,
                format!("duration '{}' is out of range", text),
                None,
            )
        })
}

/// Convert fractional-second digits to nanoseconds. More than nine digits
/// raises `over_long` (E3003 for time/instant, E3001 for durations).
fn fraction_nanos(
    digits: &str,
    ctx: &ResolveContext<'_>,
    over_long: ErrorCode,
) -> Result<u32, ParseError> {
    if digits.len() > 9 {
        return Err(ctx.error(
            over_long,
            format!(
                "fractional seconds support at most nine digits, got {}",
                digits.len()
            ),
            None,
        ));
    }
    let mut nanos: u32 = digits.parse().expect("checked digits");
    for _ in digits.len()..9 {
        nanos *= 10;
    }
    Ok(nanos)
}
