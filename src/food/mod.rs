pub mod recipes;

pub use recipes::{CorpusLoader, Recipe, RecipeSource};
