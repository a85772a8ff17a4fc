/// Trait for floating-point scalars, so that trees and predicates can be generic
/// over {f32, f64} without scattering `num_traits` bounds everywhere.
///
/// `Send + Sync` is part of the contract: sample evaluation may run on worker
/// threads during parallel construction.
///
/// # Safety
///
/// * This is only intended to be implemented on floating-point types.
#[allow(unsafe_code)]
pub unsafe trait Float:
    num_traits::Float
    + num_traits::ToPrimitive
    + nalgebra::Scalar
    + std::fmt::Display
    + std::ops::AddAssign
    + std::ops::SubAssign
    + Copy
    + Send
    + Sync
    + 'static
{
    const ZERO: Self;
    const ONE: Self;
    const TWO: Self;

    const MIN: Self;
    const MAX: Self;

    /// Lossy conversion from an index or count.
    fn of_usize(n: usize) -> Self;
}

macro_rules! impl_float {
    ($($real:ty),+) => {$(
        #[allow(unsafe_code)]
        unsafe impl Float for $real {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            const TWO: Self = 2.0;

            const MIN: Self = <$real>::MIN;
            const MAX: Self = <$real>::MAX;

            #[inline]
            fn of_usize(n: usize) -> Self {
                n as Self
            }
        }
    )+};
}

impl_float! {f32, f64}
