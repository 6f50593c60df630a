/// `Debug` when the `tracing` feature is on, so instrumented functions can
/// record their arguments; no bound otherwise.
#[cfg(feature = "tracing")]
pub trait CfgDebug: std::fmt::Debug {}

#[cfg(feature = "tracing")]
impl<T> CfgDebug for T where T: std::fmt::Debug + ?Sized {}

#[cfg(not(feature = "tracing"))]
pub trait CfgDebug {}

#[cfg(not(feature = "tracing"))]
impl<T> CfgDebug for T where T: ?Sized {}

/// Name of a group of items that can be invalidated together.
pub trait Tag: CfgDebug {
    fn id(&self) -> &str;
}

impl<T> Tag for T
where
    T: AsRef<str> + CfgDebug + ?Sized,
{
    fn id(&self) -> &str {
        self.as_ref()
    }
}
