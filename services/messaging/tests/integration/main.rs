mod chatbot_test;
mod history_test;
mod reconcile_test;
mod retry_test;
mod router_test;
mod webhook_test;
mod worker_test;
