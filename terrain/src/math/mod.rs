mod linspace;
mod median;

pub(crate) use {linspace::linspace, median::median};
