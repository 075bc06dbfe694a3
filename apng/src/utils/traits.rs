pub(crate) trait SafeAccess<T> {
    fn check_range(&self, range: std::ops::Range<usize>) -> Result<(), std::io::Error>;
}

impl<T> SafeAccess<T> for [T] {
    /// Checks if a range is valid for this slice without retrieving the elements.
    ///
    /// # Errors
    ///
    /// This function will return an `std::io::Error` with `std::io::ErrorKind::InvalidData` if:
    /// - The range start is greater than the range end
    /// - The range end is greater than the slice length
    fn check_range(&self, range: std::ops::Range<usize>) -> Result<(), std::io::Error> {
        if range.start > range.end {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid range: start ({}) > end ({})", range.start, range.end),
            ));
        }

        if range.end > self.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Range end {} out of bounds (len {})", range.end, self.len()),
            ));
        }

        Ok(())
    }
}
