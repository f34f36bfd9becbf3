//! Reference native library for dllbridge's own integration tests
//! (SPEC_FULL.md §8). Every exported symbol here is deliberately tiny and
//! has an obviously-correct expected result, so a scenario test only has to
//! assert on the return/out-pointer value, not reimplement the function.
//!
//! Built as a `cdylib` so `dllbridge-server`'s `LoadedLibrary` can load it
//! through `libloading` exactly as it would load a real DLL, and as an
//! `rlib` so `dllbridge-server`'s test suite can link the plain `extern "C"
//! fn` symbols directly without a filesystem dlopen when that's enough.

/// S1: two scalar arguments, one scalar return.
#[unsafe(no_mangle)]
pub extern "C" fn add(a: i32, b: i32) -> i32 {
    a + b
}

/// S2: a single out-pointer argument, no return value.
#[unsafe(no_mangle)]
pub extern "C" fn square(x: *mut i32) {
    if x.is_null() {
        return;
    }
    unsafe {
        *x *= *x;
    }
}

/// S3: a read-only buffer addressed by a paired length argument (memsync).
#[unsafe(no_mangle)]
pub extern "C" fn sum(buf: *const i32, len: i32) -> i64 {
    if buf.is_null() || len <= 0 {
        return 0;
    }
    let slice = unsafe { std::slice::from_raw_parts(buf, len as usize) };
    slice.iter().map(|&v| i64::from(v)).sum()
}

/// S4: a read-write buffer (memsync) the callee mutates in place.
#[unsafe(no_mangle)]
pub extern "C" fn reverse(buf: *mut u8, len: i32) {
    if buf.is_null() || len <= 0 {
        return;
    }
    let slice = unsafe { std::slice::from_raw_parts_mut(buf, len as usize) };
    slice.reverse();
}

/// S5: struct-by-value arguments, scalar return (struct-by-value *return* is
/// unsupported by the server's marshalling layer, so this reports through a
/// plain `f64` rather than a `Point`).
#[repr(C)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[unsafe(no_mangle)]
pub extern "C" fn dot(a: Point, b: Point) -> f64 {
    a.x * b.x + a.y * b.y
}

/// S6: a struct field itself addresses a memory-sync buffer (`data`/`len`
/// nested one level inside the out-pointer argument).
#[repr(C)]
pub struct Buffer {
    pub data: *const u8,
    pub len: i32,
}

#[unsafe(no_mangle)]
pub extern "C" fn buffer_checksum(buf: *const Buffer) -> i64 {
    if buf.is_null() {
        return 0;
    }
    let buffer = unsafe { &*buf };
    if buffer.data.is_null() || buffer.len <= 0 {
        return 0;
    }
    let slice = unsafe { std::slice::from_raw_parts(buffer.data, buffer.len as usize) };
    slice.iter().map(|&b| i64::from(b)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_returns_the_sum() {
        assert_eq!(add(3, 4), 7);
    }

    #[test]
    fn square_mutates_in_place() {
        let mut x = 6;
        square(&mut x);
        assert_eq!(x, 36);
    }

    #[test]
    fn square_tolerates_a_null_pointer() {
        square(std::ptr::null_mut());
    }

    #[test]
    fn sum_adds_every_element() {
        let xs = [1, 2, 3, 4];
        assert_eq!(sum(xs.as_ptr(), xs.len() as i32), 10);
    }

    #[test]
    fn reverse_flips_the_buffer_in_place() {
        let mut bytes = [1u8, 2, 3, 4, 5];
        reverse(bytes.as_mut_ptr(), bytes.len() as i32);
        assert_eq!(bytes, [5, 4, 3, 2, 1]);
    }

    #[test]
    fn dot_computes_the_dot_product() {
        let a = Point { x: 1.0, y: 2.0 };
        let b = Point { x: 3.0, y: 4.0 };
        assert_eq!(dot(a, b), 11.0);
    }

    #[test]
    fn buffer_checksum_reads_through_the_nested_pointer() {
        let bytes = [1u8, 2, 3];
        let buffer = Buffer {
            data: bytes.as_ptr(),
            len: bytes.len() as i32,
        };
        assert_eq!(buffer_checksum(&buffer), 6);
    }
}
