use super::cursor::{ByteCursor, Tag};
use super::error::DecodeError;

/// Walks every field of one message, handing each tag to `dispatch`.
///
/// `dispatch` must consume the field payload from the cursor, either by
/// reading it or by calling [`ByteCursor::skip_field`] with the tag's wire
/// type. The walk ends when the buffer is exhausted.
pub fn walk_message<'a, F>(buf: &'a [u8], mut dispatch: F) -> Result<(), DecodeError>
where
    F: FnMut(Tag, &mut ByteCursor<'a>) -> Result<(), DecodeError>,
{
    let mut cursor = ByteCursor::new(buf);
    while !cursor.is_empty() {
        let tag = cursor.read_tag()?;
        dispatch(tag, &mut cursor)?;
    }
    Ok(())
}
