/// Array of N1 + N2 elements with uniform access
///
/// This is a workaround for [T; {N1 + N2}] in stable rust
#[repr(C)]
pub struct DuplexArray<T, const N1: usize, const N2: usize>([T; N1], [T; N2]);

impl<T, const N1: usize, const N2: usize> DuplexArray<T, N1, N2> {
    #[allow(clippy::redundant_closure)]
    pub fn from_fn(mut cb: impl FnMut(usize) -> T) -> Self {
        Self(
            core::array::from_fn(|i| cb(i)),
            core::array::from_fn(|i| cb(N1 + i)),
        )
    }

    pub const fn len(&self) -> usize {
        N1 + N2
    }
}

impl<T, const N1: usize, const N2: usize> core::ops::Deref for DuplexArray<T, N1, N2> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        // SAFETY: DuplexArray is #[repr(C)] so the two arrays are laid out contiguously
        unsafe { core::slice::from_raw_parts(self.0.as_ptr(), N1 + N2) }
    }
}

impl<T, const N1: usize, const N2: usize> core::ops::DerefMut for DuplexArray<T, N1, N2> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: DuplexArray is #[repr(C)] so the two arrays are laid out contiguously
        unsafe { core::slice::from_raw_parts_mut(self.0.as_mut_ptr(), N1 + N2) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_indexing() {
        let array = DuplexArray::<usize, 2, 3>::from_fn(|i| i * 10);
        assert_eq!(array.len(), 5);
        assert_eq!(&array[..], &[0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_empty_head() {
        let mut array = DuplexArray::<u8, 0, 2>::from_fn(|i| i as u8);
        array[1] = 7;
        assert_eq!(&array[..], &[0, 7]);
    }
}
