mod immune;
mod pathogen;
mod spawn;
