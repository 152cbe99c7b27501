mod http;
mod properties;
mod scenarios;
