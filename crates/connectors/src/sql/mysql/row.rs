use chrono::{NaiveDate, NaiveDateTime};
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use mysql_async::{
    Column, Row as MySqlRow, Value as MySqlValue,
    consts::{ColumnFlags, ColumnType},
};
use tracing::warn;

/// MySQL's character set id for binary strings.
const BINARY_CHARSET: u16 = 63;

pub fn to_row_data(row: &MySqlRow, table: &str) -> RowData {
    let field_values = row
        .columns_ref()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let value = row
                .as_ref(index)
                .map(|raw| convert(raw, column))
                .unwrap_or(Value::Null);
            FieldValue::new(&column.name_str(), value)
        })
        .collect();
    RowData::new(table, field_values)
}

/// Converts one cell. The text protocol delivers everything as bytes, so the
/// column type decides how those are read.
pub fn convert(raw: &MySqlValue, column: &Column) -> Value {
    match raw {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Int(i) => Value::Int(*i),
        MySqlValue::UInt(u) => Value::Uint(*u),
        MySqlValue::Float(f) => Value::Float(f64::from(*f)),
        MySqlValue::Double(f) => Value::Float(*f),
        MySqlValue::Date(y, m, d, h, i, s, us) => {
            convert_date(column.column_type(), *y, *m, *d, *h, *i, *s, *us)
        }
        MySqlValue::Time(negative, days, h, i, s, us) => {
            let hours = *days * 24 + u32::from(*h);
            let sign = if *negative { "-" } else { "" };
            let text = if *us > 0 {
                format!("{sign}{hours:02}:{i:02}:{s:02}.{us:06}")
            } else {
                format!("{sign}{hours:02}:{i:02}:{s:02}")
            };
            Value::String(text)
        }
        MySqlValue::Bytes(bytes) => convert_bytes(bytes, column),
    }
}

fn convert_bytes(bytes: &[u8], column: &Column) -> Value {
    let text = || String::from_utf8(bytes.to_vec());
    let unsigned = column.flags().contains(ColumnFlags::UNSIGNED_FLAG);

    match column.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            let parsed = text().ok().and_then(|s| {
                if unsigned {
                    s.parse::<u64>().ok().map(|u| {
                        i64::try_from(u).map(Value::Int).unwrap_or(Value::Uint(u))
                    })
                } else {
                    s.parse::<i64>().ok().map(Value::Int)
                }
            });
            parsed.unwrap_or_else(|| fallback_bytes(bytes, column))
        }
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => text()
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .map(Value::Float)
            .unwrap_or_else(|| fallback_bytes(bytes, column)),
        ColumnType::MYSQL_TYPE_JSON => text()
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .map(Value::Json)
            .unwrap_or_else(|| fallback_bytes(bytes, column)),
        ColumnType::MYSQL_TYPE_DATE => text()
            .ok()
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
            .map(Value::Date)
            .unwrap_or_else(|| fallback_bytes(bytes, column)),
        ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => text()
            .ok()
            .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f").ok())
            .map(|naive| Value::Timestamp(naive.and_utc()))
            .unwrap_or_else(|| fallback_bytes(bytes, column)),
        // DECIMAL stays textual so values survive a round trip unchanged.
        _ => fallback_bytes(bytes, column),
    }
}

fn fallback_bytes(bytes: &[u8], column: &Column) -> Value {
    if column.character_set() == BINARY_CHARSET
        && !matches!(
            column.column_type(),
            ColumnType::MYSQL_TYPE_NEWDECIMAL | ColumnType::MYSQL_TYPE_DECIMAL
        )
    {
        return Value::Bytes(bytes.to_vec());
    }
    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => Value::String(s),
        Err(_) => Value::Bytes(bytes.to_vec()),
    }
}

#[allow(clippy::too_many_arguments)]
fn convert_date(kind: ColumnType, y: u16, m: u8, d: u8, h: u8, i: u8, s: u8, us: u32) -> Value {
    let Some(date) = NaiveDate::from_ymd_opt(i32::from(y), u32::from(m), u32::from(d)) else {
        // Zero dates have no chrono form; keep MySQL's spelling.
        warn!(year = y, month = m, day = d, "Unrepresentable date value kept as text");
        return Value::String(format!(
            "{y:04}-{m:02}-{d:02} {h:02}:{i:02}:{s:02}"
        ));
    };
    if kind == ColumnType::MYSQL_TYPE_DATE {
        return Value::Date(date);
    }
    date.and_hms_micro_opt(u32::from(h), u32::from(i), u32::from(s), us)
        .map(|naive| Value::Timestamp(naive.and_utc()))
        .unwrap_or(Value::Date(date))
}
