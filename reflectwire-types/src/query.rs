//! Records for paging through large result sets.

use reflectwire::Record;

/// Asks for one page of results, either after a key returned by the previous page or at an
/// offset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Record)]
#[reflect(name = "query.v1.PageRequest")]
pub struct PageRequest {
    /// The `next_key` of the previous page. Takes precedence over `offset`.
    pub key: Vec<u8>,
    pub offset: u64,
    pub limit: u64,
    /// Asks for the total number of results, which may be expensive to compute.
    pub count_total: bool,
    /// Asks for results in descending order.
    pub reverse: bool,
    #[reflect(unknown_fields)]
    pub unknown_fields: Vec<u8>,
}

/// Describes the page of results it accompanies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Record)]
#[reflect(name = "query.v1.PageResponse")]
pub struct PageResponse {
    /// Where the next page starts; empty on the last page.
    pub next_key: Vec<u8>,
    /// The total number of results, when asked for.
    pub total: u64,
    #[reflect(unknown_fields)]
    pub unknown_fields: Vec<u8>,
}

impl PageResponse {
    pub fn has_next_page(&self) -> bool {
        !self.next_key.is_empty()
    }
}
