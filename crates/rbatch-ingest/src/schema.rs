//! Declared record layout and column coercion
//!
//! The source file and the target table share one column order. A
//! [`TableSchema`] carries that order together with each column's SQL type
//! so the writer can coerce raw strings at bind time.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{IngestError, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQL-side type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Double,
    Date,
    DateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name in the target table
    pub name: &'static str,
    /// Human-readable header used in the failure artifact
    pub label: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    const fn new(name: &'static str, label: &'static str, kind: ColumnKind) -> Self {
        Self { name, label, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: &'static str,
    pub columns: Vec<Column>,
    /// Index of the natural-key column used for failure dedup
    pub key_column: usize,
}

impl TableSchema {
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.label).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Coerce one row of raw values, column by column
    pub fn coerce_row(&self, values: &[String]) -> Result<Vec<SqlValue>> {
        self.columns
            .iter()
            .zip(values)
            .map(|(column, raw)| coerce(column, raw))
            .collect()
    }
}

/// A bound parameter value; `None` binds SQL NULL
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Integer(Option<i32>),
    Double(Option<f64>),
    Date(Option<NaiveDate>),
    DateTime(Option<NaiveDateTime>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Text(v) => v.is_none(),
            SqlValue::Integer(v) => v.is_none(),
            SqlValue::Double(v) => v.is_none(),
            SqlValue::Date(v) => v.is_none(),
            SqlValue::DateTime(v) => v.is_none(),
        }
    }
}

/// Convert a raw field into its column type
///
/// Blank input is always NULL, never an error. Non-text values are trimmed
/// before parsing.
pub fn coerce(column: &Column, raw: &str) -> Result<SqlValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(match column.kind {
            ColumnKind::Text => SqlValue::Text(None),
            ColumnKind::Integer => SqlValue::Integer(None),
            ColumnKind::Double => SqlValue::Double(None),
            ColumnKind::Date => SqlValue::Date(None),
            ColumnKind::DateTime => SqlValue::DateTime(None),
        });
    }

    let failed = |reason: String| IngestError::Coercion {
        column: column.name.to_string(),
        value: raw.to_string(),
        reason,
    };

    match column.kind {
        ColumnKind::Text => Ok(SqlValue::Text(Some(raw.to_string()))),
        ColumnKind::Integer => trimmed
            .parse::<i32>()
            .map(|v| SqlValue::Integer(Some(v)))
            .map_err(|e| failed(e.to_string())),
        ColumnKind::Double => trimmed
            .parse::<f64>()
            .map(|v| SqlValue::Double(Some(v)))
            .map_err(|e| failed(e.to_string())),
        ColumnKind::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
            .map(|v| SqlValue::Date(Some(v)))
            .map_err(|e| failed(e.to_string())),
        ColumnKind::DateTime => NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
            .map(|v| SqlValue::DateTime(Some(v)))
            .map_err(|e| failed(e.to_string())),
    }
}

/// Nationwide general-restaurant standard dataset
pub fn restaurant_schema() -> TableSchema {
    use ColumnKind::*;

    TableSchema {
        table: "restaurant",
        key_column: 0,
        columns: vec![
            Column::new("record_number", "번호", Integer),
            Column::new("service_name", "개방서비스명", Text),
            Column::new("service_id", "개방서비스아이디", Text),
            Column::new("region_code", "개방자치단체코드", Text),
            Column::new("management_number", "관리번호", Text),
            Column::new("license_date", "인허가일자", Date),
            Column::new("cancel_date", "인허가취소일자", Date),
            Column::new("business_status_code", "영업상태구분코드", Text),
            Column::new("business_status_name", "영업상태명", Text),
            Column::new("detail_status_code", "상세영업상태코드", Text),
            Column::new("detail_status_name", "상세영업상태명", Text),
            Column::new("close_date", "폐업일자", Date),
            Column::new("suspend_start_date", "휴업시작일자", Date),
            Column::new("suspend_end_date", "휴업종료일자", Date),
            Column::new("reopen_date", "재개업일자", Date),
            Column::new("phone", "소재지전화", Text),
            Column::new("area_size", "소재지면적", Text),
            Column::new("postal_code", "소재지우편번호", Text),
            Column::new("full_address", "소재지전체주소", Text),
            Column::new("road_address", "도로명전체주소", Text),
            Column::new("road_postal_code", "도로명우편번호", Text),
            Column::new("store_name", "사업장명", Text),
            Column::new("last_modified", "최종수정시점", DateTime),
            Column::new("data_update_type", "데이터갱신구분", Text),
            Column::new("data_update_date", "데이터갱신일자", DateTime),
            Column::new("business_type", "업태구분명", Text),
            Column::new("coord_x", "좌표정보x(epsg5174)", Double),
            Column::new("coord_y", "좌표정보y(epsg5174)", Double),
            Column::new("sanitation_type", "위생업태명", Text),
            Column::new("male_employee", "남성종사자수", Integer),
            Column::new("female_employee", "여성종사자수", Integer),
            Column::new("around_info", "영업장주변구분명", Text),
            Column::new("grade", "등급구분명", Text),
            Column::new("water_type", "급수시설구분명", Text),
            Column::new("total_employees", "총직원수", Integer),
            Column::new("hq_employees", "본사직원수", Integer),
            Column::new("office_employees", "공장사무직직원수", Integer),
            Column::new("sales_employees", "공장판매직직원수", Integer),
            Column::new("production_employees", "공장생산직직원수", Integer),
            Column::new("building_ownership", "건물소유구분명", Text),
            Column::new("guarantee_amount", "보증액", Integer),
            Column::new("monthly_rent", "월세액", Integer),
            Column::new("multi_use_yn", "다중이용업소여부", Text),
            Column::new("total_scale", "시설총규모", Text),
            Column::new("traditional_id", "전통업소지정번호", Text),
            Column::new("main_menu", "전통업소주된음식", Text),
            Column::new("homepage", "홈페이지", Text),
        ],
    }
}
