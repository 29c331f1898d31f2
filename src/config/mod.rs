pub mod scraper;

pub use scraper::ScraperConfig;
