use super::Sort;

pub type AstResult<T> = std::result::Result<T, AstError>;

#[derive(thiserror::Error, Debug)]
pub enum AstError {
    #[error("sort {0} was expected, but {1} was found")]
    UnexpectedSort(Sort, Sort),

    #[error("sort {0} and {1} should be identical")]
    SortIntegrity(Sort, Sort),

    #[error("bit-vector size {0} is out of the supported 1..=512 range")]
    SizeOutOfRange(u32),

    #[error("extract [{high}:{low}] does not fit a {size}-bit value")]
    ExtractBounds { high: u32, low: u32, size: u32 },

    #[error("undefined variable {0} was referenced")]
    UndefinedVariable(String),
}
