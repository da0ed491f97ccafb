//! HTTP handlers for the propane endpoints and dashboard.

use crate::reading::ReadingStore;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// Body of `GET /api/propane`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropaneResponse {
    pub weight: f64,
    /// RFC 3339 in the display time zone
    pub timestamp: String,
    pub remaining: f64,
    /// Same sentence the chat bots reply with
    pub message: String,
}

/// Current summary as plain text, the same string the chat bots send.
pub async fn propane_text(State(store): State<Arc<ReadingStore>>) -> String {
    store.summary()
}

/// Current reading as JSON.
pub async fn propane_json(State(store): State<Arc<ReadingStore>>) -> Response {
    // One snapshot so the message always matches the numbers beside it.
    let reading = store.get();
    let body = PropaneResponse {
        weight: reading.weight,
        timestamp: store.local_timestamp(&reading).to_rfc3339(),
        remaining: reading.remaining_percent,
        message: store.summarize(&reading),
    };

    match serde_json::to_string(&body) {
        Ok(json) => ([(header::CONTENT_TYPE, "application/json")], json).into_response(),
        Err(e) => {
            error!("Failed to encode propane JSON: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode JSON").into_response()
        }
    }
}

/// Health check endpoint.
pub async fn health_check(State(store): State<Arc<ReadingStore>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "propane-bot",
        "version": env!("CARGO_PKG_VERSION"),
        "has_reading": store.has_reading(),
    }))
}

/// Serve the dashboard page.
pub async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// Self-contained dashboard that polls `/api/propane` every 5 seconds.
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Propane Bot - Cylinder Level</title>
    <style>
        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            color: #333;
            min-height: 100vh;
            padding: 20px;
        }

        .container {
            max-width: 900px;
            margin: 0 auto;
        }

        .header {
            text-align: center;
            margin-bottom: 30px;
            color: white;
        }

        .header h1 {
            font-size: clamp(1.8rem, 5vw, 3rem);
            margin-bottom: 10px;
            text-shadow: 2px 2px 4px rgba(0,0,0,0.3);
        }

        .header p {
            font-size: 1.1rem;
            opacity: 0.9;
        }

        .card {
            background: white;
            border-radius: 15px;
            padding: 25px;
            box-shadow: 0 10px 30px rgba(0,0,0,0.1);
            margin-bottom: 20px;
        }

        .message {
            border-left: 4px solid #667eea;
            padding-left: 15px;
            font-size: 1rem;
        }

        .message.error {
            border-left-color: #f44336;
            color: #c62828;
        }

        .stats {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
            gap: 20px;
            margin-bottom: 20px;
        }

        .stat {
            text-align: center;
        }

        .stat-label {
            font-size: 0.85rem;
            color: #666;
            text-transform: uppercase;
            letter-spacing: 0.5px;
            margin-bottom: 8px;
        }

        .stat-value {
            font-size: clamp(1.4rem, 4vw, 2.4rem);
            font-weight: bold;
        }

        .stat-unit {
            font-size: 0.8rem;
            color: #666;
        }

        .gauge {
            width: 100%;
            height: 48px;
            background: #e0e0e0;
            border-radius: 24px;
            overflow: hidden;
            box-shadow: inset 0 2px 4px rgba(0,0,0,0.1);
        }

        .gauge-fill {
            height: 100%;
            width: 0%;
            display: flex;
            align-items: center;
            justify-content: center;
            color: white;
            font-weight: bold;
            transition: width 0.5s ease;
        }

        .level-ok {
            background: linear-gradient(45deg, #4CAF50, #8BC34A);
        }

        .level-warn {
            background: linear-gradient(45deg, #FF9800, #FFC107);
        }

        .level-low {
            background: linear-gradient(45deg, #f44336, #FF5722);
        }

        .footer {
            text-align: center;
            color: white;
            opacity: 0.85;
            font-size: 0.9rem;
        }

        @media (max-width: 600px) {
            body {
                padding: 10px;
            }

            .stats {
                grid-template-columns: 1fr;
            }
        }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>🔥 Propane Bot</h1>
            <p>Cylinder level from the scale</p>
        </div>

        <div class="card">
            <div class="message" id="message">Loading propane data...</div>
        </div>

        <div class="stats">
            <div class="card stat">
                <div class="stat-label">Weight</div>
                <div class="stat-value" id="weight">--</div>
                <div class="stat-unit">lbs</div>
            </div>
            <div class="card stat">
                <div class="stat-label">Remaining</div>
                <div class="stat-value" id="remaining">--</div>
                <div class="stat-unit">%</div>
            </div>
            <div class="card stat">
                <div class="stat-label">Last Reading</div>
                <div class="stat-value" id="timestamp">--</div>
                <div class="stat-unit"></div>
            </div>
        </div>

        <div class="card">
            <div class="gauge">
                <div class="gauge-fill level-ok" id="gauge">0%</div>
            </div>
        </div>

        <div class="footer">Refreshes every 5 seconds</div>
    </div>

    <script>
        const REFRESH_MS = 5000;

        function levelClass(percent) {
            if (percent > 50) {
                return 'level-ok';
            }
            if (percent > 25) {
                return 'level-warn';
            }
            return 'level-low';
        }

        function render(data) {
            const percent = Math.round(data.remaining);
            const hasReading = data.weight !== 0 || data.remaining !== 0;

            document.getElementById('weight').textContent = Math.round(data.weight);
            document.getElementById('remaining').textContent = percent;
            document.getElementById('timestamp').textContent = hasReading
                ? new Date(data.timestamp).toLocaleString()
                : 'waiting';

            const gauge = document.getElementById('gauge');
            gauge.style.width = Math.min(Math.max(percent, 0), 100) + '%';
            gauge.textContent = percent + '%';
            gauge.className = 'gauge-fill ' + levelClass(percent);

            const message = document.getElementById('message');
            message.textContent = hasReading ? data.message : 'No reading from the scale yet';
            message.className = 'message';
        }

        function showError(text) {
            const message = document.getElementById('message');
            message.textContent = text;
            message.className = 'message error';
        }

        async function refresh() {
            try {
                const response = await fetch('/api/propane');
                if (!response.ok) {
                    throw new Error('HTTP ' + response.status);
                }
                render(await response.json());
            } catch (e) {
                console.error('Failed to fetch propane data:', e);
                showError('Unable to fetch propane data');
            }
        }

        refresh();
        const timer = setInterval(refresh, REFRESH_MS);
        window.addEventListener('beforeunload', () => clearInterval(timer));
    </script>
</body>
</html>"#;
