#[derive(Debug, Clone, Copy, PartialEq, Eq, onlyerror::Error)]
pub enum AllocError {
    /// No bank in the registry can ever fit the request.
    #[error("no bank can fit a request of {0} bytes")]
    SizeTooLarge(usize),
    /// Every bank large enough for the request is out of blocks.
    #[error("all banks large enough for the request are exhausted")]
    Exhausted,
    /// A new on-demand bank could not be inserted into the registry.
    #[error("bank registry is full")]
    RegistryFull,
}
