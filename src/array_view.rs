//! The typed array façade (component A of the design).
//!
//! Every bound buffer — indices, vertices, normals, UV maps, attribute maps —
//! is exposed through [`ArrayView`] / [`ArrayViewMut`]: uniform `get`/`set`
//! of an integer or float component at `(element, component)` over a buffer
//! the caller owns. The view never frees the buffer; it borrows for as long
//! as the Rust borrow checker lets it, which stands in for the reference
//! implementation's "the caller owns the memory, the view never frees it"
//! rule without needing a runtime check.

/// The element type underlying a bound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ElementKind {
    /// Size in bytes of one scalar of this kind.
    pub fn size(self) -> usize {
        match self {
            ElementKind::I8 | ElementKind::U8 => 1,
            ElementKind::I16 | ElementKind::U16 => 2,
            ElementKind::I32 | ElementKind::U32 | ElementKind::F32 => 4,
            ElementKind::F64 => 8,
        }
    }
}

/// A read-only typed view over an externally-owned, byte-addressed buffer.
#[derive(Debug, Clone, Copy)]
pub struct ArrayView<'a> {
    data: &'a [u8],
    components: u32,
    kind: ElementKind,
    stride: usize,
}

/// A read-write typed view over an externally-owned, byte-addressed buffer.
pub struct ArrayViewMut<'a> {
    data: &'a mut [u8],
    components: u32,
    kind: ElementKind,
    stride: usize,
}

fn effective_stride(components: u32, kind: ElementKind, stride: usize) -> usize {
    if stride == 0 {
        components as usize * kind.size()
    } else {
        stride
    }
}

impl<'a> ArrayView<'a> {
    /// Bind a view over `data`. Returns `None` ("absent", per spec) when
    /// `components == 0` — the null-base case from the C API has no
    /// counterpart once the buffer is a Rust slice, since an absent binding
    /// is simply "no slice was bound" at the call site.
    pub fn bind(data: &'a [u8], components: u32, kind: ElementKind, stride: usize) -> Option<Self> {
        if components == 0 {
            return None;
        }
        Some(ArrayView {
            data,
            components,
            kind,
            stride: effective_stride(components, kind, stride),
        })
    }

    pub fn components(&self) -> u32 {
        self.components
    }

    fn element_offset(&self, element: u32, component: u32) -> Option<usize> {
        if component >= self.components {
            return None;
        }
        let offset = element as usize * self.stride + component as usize * self.kind.size();
        if offset + self.kind.size() > self.data.len() {
            return None;
        }
        Some(offset)
    }

    /// Read the raw bytes at `(element, component)` as a 64-bit integer.
    /// Out-of-range components read as 0, per spec.
    pub fn get_int(&self, element: u32, component: u32) -> i64 {
        let Some(offset) = self.element_offset(element, component) else {
            return 0;
        };
        let bytes = &self.data[offset..offset + self.kind.size()];
        match self.kind {
            ElementKind::I8 => bytes[0] as i8 as i64,
            ElementKind::U8 => bytes[0] as i64,
            ElementKind::I16 => i16::from_ne_bytes(bytes.try_into().unwrap()) as i64,
            ElementKind::U16 => u16::from_ne_bytes(bytes.try_into().unwrap()) as i64,
            ElementKind::I32 => i32::from_ne_bytes(bytes.try_into().unwrap()) as i64,
            ElementKind::U32 => u32::from_ne_bytes(bytes.try_into().unwrap()) as i64,
            ElementKind::F32 => f32::from_ne_bytes(bytes.try_into().unwrap()) as i64,
            ElementKind::F64 => f64::from_ne_bytes(bytes.try_into().unwrap()) as i64,
        }
    }

    /// Read `(element, component)` as `f32`, applying the spec's fixed-point
    /// conversions for 8-bit integer kinds. Out-of-range components read as
    /// 0.0.
    pub fn get_float(&self, element: u32, component: u32) -> f32 {
        let Some(offset) = self.element_offset(element, component) else {
            return 0.0;
        };
        let bytes = &self.data[offset..offset + self.kind.size()];
        match self.kind {
            ElementKind::I8 => (bytes[0] as i8) as f32 / 127.0,
            ElementKind::U8 => bytes[0] as f32 / 255.0,
            ElementKind::I16 => i16::from_ne_bytes(bytes.try_into().unwrap()) as f32,
            ElementKind::U16 => u16::from_ne_bytes(bytes.try_into().unwrap()) as f32,
            ElementKind::I32 => i32::from_ne_bytes(bytes.try_into().unwrap()) as f32,
            ElementKind::U32 => u32::from_ne_bytes(bytes.try_into().unwrap()) as f32,
            ElementKind::F32 => f32::from_ne_bytes(bytes.try_into().unwrap()),
            ElementKind::F64 => f64::from_ne_bytes(bytes.try_into().unwrap()) as f32,
        }
    }

    /// Fast path for tightly packed `f32 * 3` elements (vertices, normals).
    /// Must agree with [`ArrayView::get_float`] bit-for-bit; asserted by the
    /// unit tests below.
    pub fn get_f32x3_packed(&self, element: u32) -> [f32; 3] {
        debug_assert_eq!(self.kind, ElementKind::F32);
        debug_assert_eq!(self.components, 3);
        debug_assert_eq!(self.stride, 12);
        let start = element as usize * 12;
        let bytes = &self.data[start..start + 12];
        [
            f32::from_ne_bytes(bytes[0..4].try_into().unwrap()),
            f32::from_ne_bytes(bytes[4..8].try_into().unwrap()),
            f32::from_ne_bytes(bytes[8..12].try_into().unwrap()),
        ]
    }
}

impl<'a> ArrayViewMut<'a> {
    pub fn bind(
        data: &'a mut [u8],
        components: u32,
        kind: ElementKind,
        stride: usize,
    ) -> Option<Self> {
        if components == 0 {
            return None;
        }
        let stride = effective_stride(components, kind, stride);
        Some(ArrayViewMut {
            data,
            components,
            kind,
            stride,
        })
    }

    pub fn components(&self) -> u32 {
        self.components
    }

    fn element_offset(&self, element: u32, component: u32) -> Option<usize> {
        if component >= self.components {
            return None;
        }
        let offset = element as usize * self.stride + component as usize * self.kind.size();
        if offset + self.kind.size() > self.data.len() {
            return None;
        }
        Some(offset)
    }

    /// Write `value` at `(element, component)`. Out-of-range components are
    /// a silent no-op, per spec.
    pub fn set_int(&mut self, element: u32, component: u32, value: i64) {
        let Some(offset) = self.element_offset(element, component) else {
            return;
        };
        let kind = self.kind;
        let bytes = &mut self.data[offset..offset + kind.size()];
        match kind {
            ElementKind::I8 => bytes[0] = value as i8 as u8,
            ElementKind::U8 => bytes[0] = value as u8,
            ElementKind::I16 => bytes.copy_from_slice(&(value as i16).to_ne_bytes()),
            ElementKind::U16 => bytes.copy_from_slice(&(value as u16).to_ne_bytes()),
            ElementKind::I32 => bytes.copy_from_slice(&(value as i32).to_ne_bytes()),
            ElementKind::U32 => bytes.copy_from_slice(&(value as u32).to_ne_bytes()),
            ElementKind::F32 => bytes.copy_from_slice(&(value as f32).to_ne_bytes()),
            ElementKind::F64 => bytes.copy_from_slice(&(value as f64).to_ne_bytes()),
        }
    }

    /// Write `value` at `(element, component)`, applying the spec's inverse
    /// fixed-point scaling for 8-bit integer kinds and truncating toward
    /// zero for other integer kinds.
    pub fn set_float(&mut self, element: u32, component: u32, value: f32) {
        let Some(offset) = self.element_offset(element, component) else {
            return;
        };
        let kind = self.kind;
        let bytes = &mut self.data[offset..offset + kind.size()];
        match kind {
            ElementKind::I8 => bytes[0] = (value * 127.0) as i8 as u8,
            ElementKind::U8 => bytes[0] = (value * 255.0) as u8,
            ElementKind::I16 => bytes.copy_from_slice(&(value as i16).to_ne_bytes()),
            ElementKind::U16 => bytes.copy_from_slice(&(value as u16).to_ne_bytes()),
            ElementKind::I32 => bytes.copy_from_slice(&(value as i32).to_ne_bytes()),
            ElementKind::U32 => bytes.copy_from_slice(&(value as u32).to_ne_bytes()),
            ElementKind::F32 => bytes.copy_from_slice(&value.to_ne_bytes()),
            ElementKind::F64 => bytes.copy_from_slice(&(value as f64).to_ne_bytes()),
        }
    }

    /// Borrow this mutable view as a read-only one, e.g. to reuse
    /// `get_float`/`get_int` after writing.
    pub fn as_view(&self) -> ArrayView<'_> {
        ArrayView {
            data: self.data,
            components: self.components,
            kind: self.kind,
            stride: self.stride,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_component_reads_as_zero() {
        let data = [1u8, 2, 3, 4];
        let view = ArrayView::bind(&data, 2, ElementKind::U8, 0).unwrap();
        assert_eq!(view.get_int(0, 5), 0);
        assert_eq!(view.get_float(0, 5), 0.0);
    }

    #[test]
    fn zero_components_is_absent() {
        let data = [0u8; 4];
        assert!(ArrayView::bind(&data, 0, ElementKind::U8, 0).is_none());
    }

    #[test]
    fn i8_float_conversion_round_trips() {
        let mut data = [0u8; 1];
        {
            let mut view = ArrayViewMut::bind(&mut data, 1, ElementKind::I8, 0).unwrap();
            view.set_float(0, 0, 1.0);
        }
        let view = ArrayView::bind(&data, 1, ElementKind::I8, 0).unwrap();
        assert_eq!(view.get_int(0, 0), 127);
        assert!((view.get_float(0, 0) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn u8_float_conversion_round_trips() {
        let mut data = [0u8; 1];
        {
            let mut view = ArrayViewMut::bind(&mut data, 1, ElementKind::U8, 0).unwrap();
            view.set_float(0, 0, 1.0);
        }
        let view = ArrayView::bind(&data, 1, ElementKind::U8, 0).unwrap();
        assert_eq!(view.get_int(0, 0), 255);
    }

    #[test]
    fn fast_path_agrees_with_generic_path() {
        let mut data = [0u8; 12 * 2];
        {
            let mut view = ArrayViewMut::bind(&mut data, 3, ElementKind::F32, 0).unwrap();
            view.set_float(0, 0, 1.5);
            view.set_float(0, 1, -2.25);
            view.set_float(0, 2, 3.0);
            view.set_float(1, 0, 10.0);
            view.set_float(1, 1, 20.0);
            view.set_float(1, 2, 30.0);
        }
        let view = ArrayView::bind(&data, 3, ElementKind::F32, 0).unwrap();
        let generic = [
            [
                view.get_float(0, 0),
                view.get_float(0, 1),
                view.get_float(0, 2),
            ],
            [
                view.get_float(1, 0),
                view.get_float(1, 1),
                view.get_float(1, 2),
            ],
        ];
        assert_eq!(generic[0], view.get_f32x3_packed(0));
        assert_eq!(generic[1], view.get_f32x3_packed(1));
    }

    #[test]
    fn default_stride_matches_component_count() {
        let data = [0u8; 16];
        let view = ArrayView::bind(&data, 4, ElementKind::F32, 0).unwrap();
        assert_eq!(view.get_int(1, 0), 0); // second element starts at byte 16, out of range
    }
}
