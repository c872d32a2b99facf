pub mod traffic_routing;
