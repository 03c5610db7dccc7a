//! FText layout, by converting a known string to text in the target
//!
//! `FText` is opaque: the only way to see where its string lives is to make
//! the engine build one. This step calls `KismetTextLibrary::Conv_StringToText`
//! through the dispatch function, then looks for the marker string inside
//! the returned text data.

use super::{DispatchInfo, Discovery};
use crate::error::{Error, Result};
use crate::flags::PropertyFlags;
use crate::offsets::FieldKey;
use crate::view::{ObjectLookup, PropertyView};
use crate::POINTER_SIZE;

use byteorder::{ByteOrder, LE};

/// Furthest the FString can sit inside the text data
const MAX_STRING_OFFSET: usize = 0x50;

/// Calls into a live target.
///
/// Implementations need code execution in the target process; discovery
/// only uses them for the steps that can't be done by reading memory.
pub trait Invoker {
    /// Copy `bytes` into target memory that stays valid for the next
    /// [`call`](Self::call), returning its address
    fn stage(&self, bytes: &[u8]) -> anyhow::Result<usize>;

    /// Run `function` on `object` through the dispatch function. `params`
    /// is the parameter block; out parameters are written back into it.
    fn call(
        &self,
        dispatch: &DispatchInfo,
        object: usize,
        function: usize,
        params: &mut [u8],
    ) -> anyhow::Result<()>;
}

fn utf16_with_nul(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|c| c.to_le_bytes())
        .collect()
}

fn property_offset(property: &PropertyView<'_>) -> Result<usize> {
    property
        .offset()
        .and_then(|o| usize::try_from(o).ok())
        .ok_or_else(|| Error::not_found("parameter offset"))
}

/// FText::TextData, FTextData's FString and sizeof(FText)
pub(super) fn text_layout(d: &mut Discovery<'_>) -> Result<()> {
    let Some(invoker) = d.invoker else {
        tracing::info!("No invoker, skipping the FText layout");
        return Ok(());
    };
    let Some(dispatch) = d.schema.dispatch else {
        return Err(Error::not_found("dispatch function (needed for FText)"));
    };

    let (text_data, string, size) = {
        let s = &*d.schema;
        let anchors = &s.config().anchors;
        let function = s
            .find_class(&anchors.text_library)
            .and_then(|c| c.find_function(&anchors.text_function))
            .ok_or_else(|| {
                Error::not_found(format!("{}::{}", anchors.text_library, anchors.text_function))
            })?;

        let params = function.properties();
        let ret = params
            .iter()
            .find(|p| p.has_flags(PropertyFlags::RETURN_PARM))
            .ok_or_else(|| Error::not_found("FText return value"))?;
        let input = params
            .iter()
            .find(|p| !p.has_flags(PropertyFlags::RETURN_PARM))
            .ok_or_else(|| Error::not_found("FString parameter"))?;

        let param_size = function
            .size()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::not_found("parameter block size"))?;
        let text_size = ret
            .element_size()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::not_found("FText size"))?;
        let ret_offset = property_offset(ret)?;
        let input_offset = property_offset(input)?;
        if ret_offset + text_size > param_size || input_offset + 0x10 > param_size {
            return Err(Error::inconsistent("parameter block", function.object().address()));
        }

        let marker = &anchors.text_marker;
        let wide = utf16_with_nul(marker);
        let length = (wide.len() / 2) as i32;

        let mut block = vec![0u8; param_size];
        let staged = invoker.stage(&wide)?;
        LE::write_u64(&mut block[input_offset..], staged as u64);
        LE::write_i32(&mut block[input_offset + 8..], length);
        LE::write_i32(&mut block[input_offset + 12..], length);

        let object = s
            .object_table()
            .get_by_index(0)
            .ok_or_else(|| Error::not_found("object 0"))?;
        invoker.call(&dispatch, object, function.object().address(), &mut block)?;

        let probe = s.probe();
        let returned = &block[ret_offset..ret_offset + text_size];
        let (text_data, data) = (0..text_size.saturating_sub(POINTER_SIZE))
            .step_by(POINTER_SIZE)
            .map(|i| (i, LE::read_u64(&returned[i..]) as usize))
            .find(|&(_, p)| probe.is_readable(p))
            .ok_or_else(|| Error::not_found("FText::TextData"))?;

        let string = (POINTER_SIZE..MAX_STRING_OFFSET).step_by(4).find(|&i| {
            let Some(chars) = probe.read_valid_ptr(data + i - POINTER_SIZE) else {
                return false;
            };
            probe.read_i32(data + i) == Some(length)
                && probe.read_bytes(chars, wide.len()).is_some_and(|b| b == wide)
        });
        (text_data, string.map(|i| i - POINTER_SIZE), text_size)
    };

    d.settle(FieldKey::TextData, Some(text_data), None);
    d.settle(FieldKey::TextString, string, None);
    d.settle(FieldKey::TextSize, Some(size), None);
    Ok(())
}
