//! `book_member_holds`: active holds per tenant and member.
//!
//! Maintained inline: the rows change in the same transaction as the events that
//! imply them, so the table never lags the register.

use crate::events::HoldRegisterEvent;
use crate::types::{BookFormat, BookId, MemberId};
use borrowing_core::event::RecordedEvent;
use borrowing_core::projection::{
    Column, ColumnType, InlineProjection, ProjectionError, ProjectionReader, Result, Row,
    RowChange, TENANT_COLUMN, TableSchema,
};
use borrowing_core::stream::TenantId;
use chrono::{DateTime, Utc};

const MEMBER_ID: &str = "member_id";
const BOOK_ID: &str = "book_id";
const FORMAT: &str = "format";
const REQUESTED_ON: &str = "requested_on";

/// Active holds, one row per (tenant, member, book, format).
pub static BOOK_MEMBER_HOLDS: TableSchema = TableSchema {
    name: "book_member_holds",
    key: &[
        Column::new(TENANT_COLUMN, ColumnType::Text),
        Column::new(MEMBER_ID, ColumnType::Uuid),
        Column::new(BOOK_ID, ColumnType::Uuid),
        Column::new(FORMAT, ColumnType::Int),
    ],
    values: &[Column::new(REQUESTED_ON, ColumnType::Timestamp)],
};

static TABLES: [&TableSchema; 1] = [&BOOK_MEMBER_HOLDS];

/// One row of [`BOOK_MEMBER_HOLDS`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookMemberHold {
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Member holding the book
    pub member_id: MemberId,
    /// Held book
    pub book_id: BookId,
    /// Held format
    pub format: BookFormat,
    /// When the hold was placed
    pub requested_on: DateTime<Utc>,
}

impl TryFrom<&Row> for BookMemberHold {
    type Error = ProjectionError;

    fn try_from(row: &Row) -> Result<Self> {
        let format = row.int(FORMAT)?;
        Ok(Self {
            tenant_id: TenantId::from(row.text(TENANT_COLUMN)?),
            member_id: MemberId::from_uuid(row.uuid(MEMBER_ID)?),
            book_id: BookId::from_uuid(row.uuid(BOOK_ID)?),
            format: BookFormat::from_i32(format).ok_or_else(|| {
                ProjectionError::Serialization(format!("unknown book format {format}"))
            })?,
            requested_on: row.timestamp(REQUESTED_ON)?,
        })
    }
}

fn key(tenant_id: &TenantId, member_id: MemberId, book_id: BookId, format: BookFormat) -> Row {
    Row::new()
        .with(TENANT_COLUMN, tenant_id)
        .with(MEMBER_ID, *member_id.as_uuid())
        .with(BOOK_ID, *book_id.as_uuid())
        .with(FORMAT, format.as_i32())
}

/// Inline projection that keeps [`BOOK_MEMBER_HOLDS`] in step with the register.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookMemberHoldProjection;

impl InlineProjection for BookMemberHoldProjection {
    fn name(&self) -> &'static str {
        "book_member_holds"
    }

    fn tables(&self) -> &'static [&'static TableSchema] {
        &TABLES
    }

    fn project(&self, event: &RecordedEvent) -> Result<Vec<RowChange>> {
        if event.event_type != HoldRegisterEvent::PLACED
            && event.event_type != HoldRegisterEvent::CANCELED
        {
            return Ok(Vec::new());
        }

        let decoded: HoldRegisterEvent = event
            .decode()
            .map_err(|e| ProjectionError::Serialization(e.to_string()))?;

        let change = match decoded {
            HoldRegisterEvent::HoldPlaced(placed) => RowChange::InsertIfAbsent {
                table: &BOOK_MEMBER_HOLDS,
                row: key(&event.tenant_id, placed.member_id, placed.book_id, placed.format)
                    .with(REQUESTED_ON, placed.requested_on),
            },
            HoldRegisterEvent::HoldCanceled(canceled) => RowChange::Delete {
                table: &BOOK_MEMBER_HOLDS,
                key: key(
                    &event.tenant_id,
                    canceled.member_id,
                    canceled.book_id,
                    canceled.format,
                ),
            },
            _ => return Ok(Vec::new()),
        };

        Ok(vec![change])
    }
}

/// Active holds of `member_id` in `tenant_id`, in (book, format) order.
///
/// # Errors
///
/// Returns [`ProjectionError`] when the reader fails or a row cannot be decoded.
pub async fn active_holds<R>(
    reader: &R,
    tenant_id: &TenantId,
    member_id: MemberId,
) -> Result<Vec<BookMemberHold>>
where
    R: ProjectionReader + ?Sized,
{
    let rows = reader
        .fetch_rows(
            tenant_id.clone(),
            &BOOK_MEMBER_HOLDS,
            Row::new().with(MEMBER_ID, *member_id.as_uuid()),
        )
        .await?;

    rows.iter().map(BookMemberHold::try_from).collect()
}
