//! The `canvas` import namespace (spec.md §4.12, feature `canvas`).
//!
//! Path, color, and stroke descriptors cross the ABI as postcard bytes;
//! this module owns the wire DTOs and converts them into
//! `sourcehost_canvas`'s plain types, which know nothing about postcard or
//! wasm memory.

use serde::Deserialize;
use sourcehost_canvas::{CanvasContext, CanvasError, CanvasImage, Font, PathOp, Point, Rect, Rgba, StrokeStyle};
use wasmtime::{Caller, Linker};

use crate::error::HostError;
use crate::memory;
use crate::resource_table::{ResourceKind, ResourcePayload, ResourceTable, Rid};
use crate::state::HostState;

#[derive(Deserialize)]
struct WirePoint {
    x: f32,
    y: f32,
}

impl From<WirePoint> for Point {
    fn from(p: WirePoint) -> Self {
        Point { x: p.x, y: p.y }
    }
}

/// Tags 0-5, matching `PathOp`'s variant order exactly.
#[derive(Deserialize)]
enum WirePathOp {
    MoveTo(WirePoint),
    LineTo(WirePoint),
    QuadTo { to: WirePoint, ctrl: WirePoint },
    CubicTo { to: WirePoint, c1: WirePoint, c2: WirePoint },
    Arc { center: WirePoint, radius: f32, start: f32, sweep: f32 },
    Close,
}

impl From<WirePathOp> for PathOp {
    fn from(op: WirePathOp) -> Self {
        match op {
            WirePathOp::MoveTo(p) => PathOp::MoveTo(p.into()),
            WirePathOp::LineTo(p) => PathOp::LineTo(p.into()),
            WirePathOp::QuadTo { to, ctrl } => PathOp::QuadTo { to: to.into(), ctrl: ctrl.into() },
            WirePathOp::CubicTo { to, c1, c2 } => PathOp::CubicTo { to: to.into(), c1: c1.into(), c2: c2.into() },
            WirePathOp::Arc { center, radius, start, sweep } => {
                PathOp::Arc { center: center.into(), radius, start, sweep }
            }
            WirePathOp::Close => PathOp::Close,
        }
    }
}

#[derive(Deserialize)]
struct WireRgba {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl From<WireRgba> for Rgba {
    fn from(c: WireRgba) -> Self {
        Rgba { r: c.r, g: c.g, b: c.b, a: c.a }
    }
}

#[derive(Deserialize)]
struct WireStroke {
    width: f32,
    color: WireRgba,
}

#[derive(Deserialize)]
struct WireRect {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl From<WireRect> for Rect {
    fn from(r: WireRect) -> Self {
        Rect { x: r.x, y: r.y, width: r.width, height: r.height }
    }
}

fn decode_ops(bytes: &[u8]) -> Result<Vec<PathOp>, CanvasError> {
    let wire: Vec<WirePathOp> = postcard::from_bytes(bytes).map_err(|_| CanvasError::InvalidPath)?;
    Ok(wire.into_iter().map(PathOp::from).collect())
}

pub fn new_context(table: &ResourceTable, width: u32, height: u32) -> Result<Rid, i32> {
    let ctx = CanvasContext::new(width, height).map_err(i32::from)?;
    Ok(table.allocate(ResourcePayload::Opaque(Box::new(ctx)), ResourceKind::CanvasContext))
}

pub fn fill(table: &ResourceTable, rid: Rid, op_bytes: &[u8], color_bytes: &[u8]) -> Result<(), i32> {
    let ops = decode_ops(op_bytes).map_err(i32::from)?;
    let color: WireRgba = postcard::from_bytes(color_bytes).map_err(|_| i32::from(CanvasError::InvalidStyle))?;
    table
        .with_payload_mut::<CanvasContext, _>(rid, |ctx| ctx.fill(&ops, color.into()))
        .ok_or(i32::from(CanvasError::InvalidContext))?
        .map_err(i32::from)
}

/// The host-side helper the dispatcher uses to turn raw fetched image bytes
/// into an image rid before calling `process_page_image` (spec.md §4.8).
pub fn decode_image_to_rid(table: &ResourceTable, bytes: &[u8]) -> Result<Rid, i32> {
    let image = CanvasImage::decode(bytes).map_err(i32::from)?;
    Ok(table.allocate(ResourcePayload::Opaque(Box::new(image)), ResourceKind::Image))
}

/// The host-side helper the dispatcher uses to extract PNG bytes back out of
/// an image rid once `process_page_image` returns (spec.md §4.8).
pub fn image_rid_to_png(table: &ResourceTable, rid: Rid) -> Option<Vec<u8>> {
    table.with_payload::<CanvasImage, _>(rid, |img| img.encode_png().ok()).flatten()
}

pub fn stroke(table: &ResourceTable, rid: Rid, op_bytes: &[u8], style_bytes: &[u8]) -> Result<(), i32> {
    let ops = decode_ops(op_bytes).map_err(i32::from)?;
    let style: WireStroke = postcard::from_bytes(style_bytes).map_err(|_| i32::from(CanvasError::InvalidStyle))?;
    let style = StrokeStyle { width: style.width, color: style.color.into() };
    table
        .with_payload_mut::<CanvasContext, _>(rid, |ctx| ctx.stroke(&ops, style))
        .ok_or(i32::from(CanvasError::InvalidContext))?
        .map_err(i32::from)
}

pub fn register(linker: &mut Linker<HostState>) -> Result<(), HostError> {
    linker.func_wrap(
        "canvas",
        "new_context",
        |caller: Caller<'_, HostState>, width: i32, height: i32| -> i32 {
            if width < 0 || height < 0 {
                return i32::from(CanvasError::InvalidBounds);
            }
            new_context(&caller.data().table, width as u32, height as u32).unwrap_or_else(|e| e)
        },
    )?;
    linker.func_wrap(
        "canvas",
        "fill",
        |caller: Caller<'_, HostState>, rid: i32, op_ptr: i32, op_len: i32, color_ptr: i32, color_len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return i32::from(CanvasError::InvalidContext) };
            let Some(ops) = memory::read_bytes(&caller, &memory, op_ptr, op_len) else {
                return i32::from(CanvasError::InvalidPath);
            };
            let Some(color) = memory::read_bytes(&caller, &memory, color_ptr, color_len) else {
                return i32::from(CanvasError::InvalidStyle);
            };
            match fill(&caller.data().table, rid, &ops, &color) {
                Ok(()) => 0,
                Err(code) => code,
            }
        },
    )?;
    linker.func_wrap(
        "canvas",
        "stroke",
        |caller: Caller<'_, HostState>, rid: i32, op_ptr: i32, op_len: i32, style_ptr: i32, style_len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return i32::from(CanvasError::InvalidContext) };
            let Some(ops) = memory::read_bytes(&caller, &memory, op_ptr, op_len) else {
                return i32::from(CanvasError::InvalidPath);
            };
            let Some(style) = memory::read_bytes(&caller, &memory, style_ptr, style_len) else {
                return i32::from(CanvasError::InvalidStyle);
            };
            match stroke(&caller.data().table, rid, &ops, &style) {
                Ok(()) => 0,
                Err(code) => code,
            }
        },
    )?;
    linker.func_wrap(
        "canvas",
        "draw_text",
        |caller: Caller<'_, HostState>, rid: i32, tptr: i32, tlen: i32, x: f32, y: f32, size: f32, color_ptr: i32, color_len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return i32::from(CanvasError::InvalidContext) };
            let Some(text) = memory::read_string(&caller, &memory, tptr, tlen) else {
                return i32::from(CanvasError::InvalidString);
            };
            let Some(color_bytes) = memory::read_bytes(&caller, &memory, color_ptr, color_len) else {
                return i32::from(CanvasError::InvalidStyle);
            };
            let Ok(color) = postcard::from_bytes::<WireRgba>(&color_bytes) else {
                return i32::from(CanvasError::InvalidStyle);
            };
            let result = caller
                .data()
                .table
                .with_payload_mut::<CanvasContext, _>(rid, |ctx| ctx.draw_text(&text, Point { x, y }, size, color.into()));
            match result {
                Some(Ok(())) => 0,
                Some(Err(e)) => i32::from(e),
                None => i32::from(CanvasError::InvalidContext),
            }
        },
    )?;
    linker.func_wrap(
        "canvas",
        "draw_image",
        |caller: Caller<'_, HostState>,
         rid: i32,
         image_rid: i32,
         src_ptr: i32,
         src_len: i32,
         dst_ptr: i32,
         dst_len: i32|
         -> i32 {
            let Some(memory) = caller.data().memory() else { return i32::from(CanvasError::InvalidContext) };
            let Some(src_bytes) = memory::read_bytes(&caller, &memory, src_ptr, src_len) else {
                return i32::from(CanvasError::InvalidSrcRect);
            };
            let Some(dst_bytes) = memory::read_bytes(&caller, &memory, dst_ptr, dst_len) else {
                return i32::from(CanvasError::InvalidSrcRect);
            };
            let (Ok(src), Ok(dst)) =
                (postcard::from_bytes::<WireRect>(&src_bytes), postcard::from_bytes::<WireRect>(&dst_bytes))
            else {
                return i32::from(CanvasError::InvalidSrcRect);
            };
            let table = &caller.data().table;
            // Clone the decoded image out from under its own lock first, then
            // drop it before taking the context's lock — the table is a
            // single mutex, so holding both at once would deadlock.
            let Some(image) = table.with_payload::<CanvasImage, _>(image_rid, |img| img.clone()) else {
                return i32::from(CanvasError::InvalidImagePointer);
            };
            let result = table.with_payload_mut::<CanvasContext, _>(rid, |ctx| ctx.draw_image(&image, src.into(), dst.into()));
            match result {
                Some(Ok(())) => 0,
                Some(Err(e)) => i32::from(e),
                None => i32::from(CanvasError::InvalidContext),
            }
        },
    )?;
    linker.func_wrap(
        "canvas",
        "get_image_data",
        |mut caller: Caller<'_, HostState>, rid: i32, out_ptr: i32| -> i32 {
            let Some(png) =
                caller.data().table.with_payload::<CanvasContext, _>(rid, |ctx| ctx.get_image_data()).and_then(|r| r.ok())
            else {
                return i32::from(CanvasError::InvalidResult);
            };
            let Some(memory) = caller.data().memory() else { return i32::from(CanvasError::InvalidResult) };
            if memory::write_bytes(&mut caller, &memory, out_ptr, &png) {
                png.len() as i32
            } else {
                i32::from(CanvasError::InvalidResult)
            }
        },
    )?;
    linker.func_wrap(
        "canvas",
        "decode_image",
        |caller: Caller<'_, HostState>, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return i32::from(CanvasError::InvalidImagePointer) };
            let Some(bytes) = memory::read_bytes(&caller, &memory, ptr, len) else {
                return i32::from(CanvasError::InvalidImagePointer);
            };
            decode_image_to_rid(&caller.data().table, &bytes).unwrap_or_else(|e| e)
        },
    )?;
    linker.func_wrap(
        "canvas",
        "image_width",
        |caller: Caller<'_, HostState>, rid: i32| -> i32 {
            caller.data().table.with_payload::<CanvasImage, _>(rid, |img| img.width() as i32).unwrap_or(-1)
        },
    )?;
    linker.func_wrap(
        "canvas",
        "image_height",
        |caller: Caller<'_, HostState>, rid: i32| -> i32 {
            caller.data().table.with_payload::<CanvasImage, _>(rid, |img| img.height() as i32).unwrap_or(-1)
        },
    )?;
    linker.func_wrap(
        "canvas",
        "system_font",
        |caller: Caller<'_, HostState>, ptr: i32, len: i32, size: f32| -> i32 {
            let Some(memory) = caller.data().memory() else { return i32::from(CanvasError::InvalidFont) };
            let Some(family) = memory::read_string(&caller, &memory, ptr, len) else {
                return i32::from(CanvasError::InvalidFont);
            };
            let font = Font::system(family, size);
            caller.data().table.allocate(ResourcePayload::Opaque(Box::new(font)), ResourceKind::Font)
        },
    )?;
    linker.func_wrap(
        "canvas",
        "load_font",
        |caller: Caller<'_, HostState>, ptr: i32, len: i32, size: f32| -> i32 {
            let Some(memory) = caller.data().memory() else { return i32::from(CanvasError::FontLoadFailed) };
            let Some(bytes) = memory::read_bytes(&caller, &memory, ptr, len) else {
                return i32::from(CanvasError::FontLoadFailed);
            };
            match Font::load(&bytes, size) {
                Ok(font) => caller.data().table.allocate(ResourcePayload::Opaque(Box::new(font)), ResourceKind::Font),
                Err(e) => i32::from(e),
            }
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_paints_a_triangle_through_postcard_bytes() {
        let table = ResourceTable::new();
        let rid = new_context(&table, 16, 16).unwrap();
        let ops = vec![
            WirePathOp::MoveTo(WirePoint { x: 1.0, y: 1.0 }),
            WirePathOp::LineTo(WirePoint { x: 14.0, y: 1.0 }),
            WirePathOp::LineTo(WirePoint { x: 7.0, y: 14.0 }),
            WirePathOp::Close,
        ];
        let op_bytes = postcard::to_allocvec(&ops).unwrap();
        let color_bytes = postcard::to_allocvec(&WireRgba { r: 255, g: 0, b: 0, a: 255 }).unwrap();
        assert!(fill(&table, rid, &op_bytes, &color_bytes).is_ok());
    }

    #[test]
    fn fill_on_an_unknown_rid_reports_invalid_context() {
        let table = ResourceTable::new();
        let op_bytes = postcard::to_allocvec(&Vec::<WirePathOp>::new()).unwrap();
        let color_bytes = postcard::to_allocvec(&WireRgba { r: 0, g: 0, b: 0, a: 255 }).unwrap();
        assert_eq!(fill(&table, 999, &op_bytes, &color_bytes), Err(i32::from(CanvasError::InvalidContext)));
    }
}
