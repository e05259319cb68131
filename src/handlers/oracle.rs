use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use super::extract::Body;
use super::utils;
use crate::AppState;
use crate::error::AppResult;
use crate::oracle::Requested;
use crate::validate::{Checker, QUESTION_MAX};

#[derive(Debug, Deserialize)]
pub struct QuestionInput {
    #[serde(default)]
    pub question: String,
    pub category: Option<String>,
}

pub async fn generate(
    State(state): State<AppState>,
    Body(input): Body<QuestionInput>,
) -> AppResult<Json<Value>> {
    let mut check = Checker::new();
    check.length("question", &input.question, 1, QUESTION_MAX);
    let requested = match input.category.as_deref().map(str::trim) {
        None | Some("") => Requested::Random,
        Some(name) => name.parse().unwrap_or_else(|()| {
            check.fail(
                "category",
                "must be one of quantum, network, metaphysical, systems, random",
            );
            Requested::Random
        }),
    };
    check.finish()?;

    let answer = state.oracle.answer(requested, &mut rand::thread_rng());
    tracing::debug!(category = answer.category.as_str(), "oracle answered");
    Ok(Json(json!({
        "status": "success",
        "response": {
            "question": input.question.trim(),
            "answer": answer.answer,
            "category": answer.category,
            "animation": answer.animation,
            "sound": answer.sound,
            "timestamp": utils::timestamp(),
        },
    })))
}

pub async fn random(State(state): State<AppState>) -> Json<Value> {
    let answer = state
        .oracle
        .answer(Requested::Random, &mut rand::thread_rng());
    Json(json!({
        "status": "success",
        "response": {
            "answer": answer.answer,
            "category": answer.category,
            "animation": answer.animation,
            "sound": answer.sound,
            "timestamp": utils::timestamp(),
        },
    }))
}

pub async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "stats": state.oracle.stats(),
    }))
}
